use async_trait::async_trait;
use rand::Rng;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use orbit_core::error::Result;
use orbit_core::event::{EngineEvent, EventBus, OutputStream};
use orbit_core::session::SessionContext;

use super::gateway::{ProcessGateway, ProcessOutput, ProcessRequest};

/// Prefix carried by every line of synthetic output.
pub const SIMULATED_MARKER: &str = "[SIMULATED]";
/// Version reported by the simulated availability probe.
pub const SIMULATED_VERSION: &str = "0.0.0 (simulated)";

/// Answers invocations with labelled synthetic output.
///
/// Used when the configured program cannot be found so the rest of the
/// engine stays usable for development. Output is never mistakable for a
/// real result: it starts with [`SIMULATED_MARKER`] and `simulated` is set.
pub struct SimulatedProcessGateway {
    bus: EventBus,
    base_delay: Duration,
    signature: String,
    version_args: Vec<String>,
}

impl SimulatedProcessGateway {
    pub fn new(bus: EventBus, base_delay: Duration) -> Self {
        Self {
            bus,
            base_delay,
            signature: String::new(),
            version_args: vec!["--version".to_string()],
        }
    }

    /// Argument list that identifies the availability probe.
    pub fn with_version_args(mut self, args: Vec<String>) -> Self {
        self.version_args = args;
        self
    }

    /// Text appended to the version probe so signature checks pass.
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    fn delay(&self) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        if base == 0 {
            return Duration::ZERO;
        }
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        Duration::from_millis(base + jitter)
    }

    fn render(&self, request: &ProcessRequest) -> String {
        if request.args == self.version_args {
            let signature = if self.signature.is_empty() {
                String::new()
            } else {
                format!(" ({})", self.signature)
            };
            return format!("{SIMULATED_VERSION}{signature}\n");
        }

        let mut out = format!(
            "{SIMULATED_MARKER} {} {}\n",
            request.program,
            request.args.join(" ")
        );
        if let Some(input) = request.stdin.as_deref() {
            let preview: String = input.chars().take(120).collect();
            out.push_str(&format!("{SIMULATED_MARKER} input: {preview}\n"));
        }
        out.push_str(&format!(
            "{SIMULATED_MARKER} the program is not installed; this output is synthetic\n"
        ));
        out
    }
}

#[async_trait]
impl ProcessGateway for SimulatedProcessGateway {
    fn is_simulated(&self) -> bool {
        true
    }

    async fn run(
        &self,
        request: ProcessRequest,
        context: &SessionContext,
        cancel: CancellationToken,
    ) -> Result<ProcessOutput> {
        let started = Instant::now();
        tracing::debug!(
            "[Gateway] Simulating {} {:?} in {:?}",
            request.program,
            request.args,
            context.working_dir
        );

        self.bus.publish(EngineEvent::ProcessStarted {
            operation_id: request.operation_id.clone(),
            program: request.program.clone(),
            pid: None,
        });

        let killed = tokio::select! {
            _ = tokio::time::sleep(self.delay()) => false,
            _ = cancel.cancelled() => true,
        };

        let stdout = if killed {
            String::new()
        } else {
            let text = self.render(&request);
            self.bus.publish(EngineEvent::OutputChunk {
                operation_id: request.operation_id.clone(),
                stream: OutputStream::Stdout,
                chunk: text.clone(),
            });
            text
        };

        let exit_code = if killed { None } else { Some(0) };
        let duration = started.elapsed();
        self.bus.publish(EngineEvent::ProcessExited {
            operation_id: request.operation_id.clone(),
            exit_code,
            duration_ms: duration.as_millis() as u64,
        });

        Ok(ProcessOutput {
            success: !killed,
            stdout,
            stderr: String::new(),
            exit_code,
            duration,
            pid: None,
            simulated: true,
            killed,
        })
    }
}
