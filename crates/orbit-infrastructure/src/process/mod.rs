//! Process gateway: the single point where external programs are spawned.
//!
//! - `gateway`: the `ProcessGateway` trait and its request/output types
//! - `system`: real processes via `tokio::process`
//! - `simulated`: labelled synthetic output for development without the program
//! - `terminate`: SIGTERM-then-SIGKILL helper

mod gateway;
mod simulated;
mod system;
mod terminate;

pub use gateway::{ProcessGateway, ProcessOutput, ProcessRequest};
pub use simulated::{SIMULATED_MARKER, SIMULATED_VERSION, SimulatedProcessGateway};
pub use system::SystemProcessGateway;
pub use terminate::terminate_child;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use orbit_core::config::CliSettings;
use orbit_core::event::EventBus;
use orbit_core::session::{build_search_path, resolve_program};

/// Picks the gateway strategy for the configured program.
///
/// The real gateway is used whenever the program resolves on the enhanced
/// search path. Otherwise the simulated gateway is used if the settings allow
/// it; if they don't, the real gateway is returned anyway so the availability
/// probe reports the spawn failure.
pub fn select_gateway(
    settings: &CliSettings,
    working_dir: &Path,
    bus: EventBus,
) -> Arc<dyn ProcessGateway> {
    let inherited = std::env::var("PATH").ok();
    let search_path = build_search_path(working_dir, &settings.extra_paths, inherited.as_deref());

    match resolve_program(&settings.program, &search_path) {
        Some(path) => {
            tracing::info!("[Gateway] Using {} at {:?}", settings.program, path);
        }
        None if settings.simulate_when_unavailable => {
            tracing::warn!(
                "[Gateway] {} not found on PATH, falling back to simulated output",
                settings.program
            );
            return Arc::new(
                SimulatedProcessGateway::new(
                    bus,
                    Duration::from_millis(settings.simulation_delay_ms),
                )
                .with_signature(settings.signature.clone())
                .with_version_args(settings.version_args.clone()),
            );
        }
        None => {
            tracing::warn!("[Gateway] {} not found on PATH", settings.program);
        }
    }

    Arc::new(
        SystemProcessGateway::new(bus)
            .with_extra_paths(settings.extra_paths.clone())
            .with_kill_grace(Duration::from_millis(settings.kill_grace_ms)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_selects_simulation_when_allowed() {
        let settings = CliSettings {
            program: "orbit-definitely-missing-binary".to_string(),
            ..CliSettings::default()
        };
        let gateway = select_gateway(&settings, &std::env::temp_dir(), EventBus::default());
        assert!(gateway.is_simulated());
    }

    #[test]
    fn test_missing_program_keeps_real_gateway_when_simulation_disabled() {
        let settings = CliSettings {
            program: "orbit-definitely-missing-binary".to_string(),
            simulate_when_unavailable: false,
            ..CliSettings::default()
        };
        let gateway = select_gateway(&settings, &std::env::temp_dir(), EventBus::default());
        assert!(!gateway.is_simulated());
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_program_uses_real_gateway() {
        let settings = CliSettings {
            program: "/bin/sh".to_string(),
            ..CliSettings::default()
        };
        let gateway = select_gateway(&settings, &std::env::temp_dir(), EventBus::default());
        assert!(!gateway.is_simulated());
    }
}
