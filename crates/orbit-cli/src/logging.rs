//! Subscriber setup for the binary.
//!
//! `RUST_LOG` (default `orbit=info`) selects what is recorded. Warnings and
//! errors go to stderr (everything with `--verbose`), the full stream goes
//! to a daily log file, and engine records are mirrored onto the event bus.

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use orbit_core::event::EventBus;
use orbit_execution::EventBusLayer;
use orbit_infrastructure::OrbitPaths;

const DEFAULT_FILTER: &str = "orbit=info";

/// Installs the global subscriber. Keep the returned guard alive until exit
/// so buffered file output is flushed.
pub fn init(bus: &EventBus, verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "orbit=debug" } else { DEFAULT_FILTER })
    });

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(if verbose {
            LevelFilter::TRACE
        } else {
            LevelFilter::WARN
        });

    let (file, guard) = match OrbitPaths::log_dir() {
        Ok(dir) if std::fs::create_dir_all(&dir).is_ok() => {
            let appender = tracing_appender::rolling::daily(&dir, "orbit.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        // Logging to file is best effort; stderr still works.
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .with(EventBusLayer::new(bus.clone()))
        .try_init()?;

    Ok(guard)
}
