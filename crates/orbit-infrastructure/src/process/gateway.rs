use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use orbit_core::error::Result;
use orbit_core::session::SessionContext;

/// One invocation of an external program.
#[derive(Debug, Clone, Default)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    /// Written to stdin, which is then closed
    pub stdin: Option<String>,
    /// Tags streamed output chunks
    pub operation_id: Option<String>,
}

impl ProcessRequest {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn operation_id(mut self, id: impl Into<String>) -> Self {
        self.operation_id = Some(id.into());
        self
    }
}

/// Completion record of a process run.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub pid: Option<u32>,
    /// Synthetic output from the simulated gateway
    pub simulated: bool,
    /// Terminated because the cancellation token fired
    pub killed: bool,
}

impl ProcessOutput {
    /// Error text for unsuccessful runs: captured stderr, or a description
    /// of how the process ended when stderr is empty.
    pub fn error(&self) -> Option<String> {
        if self.success {
            return None;
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return Some(stderr.to_string());
        }
        Some(match (self.killed, self.exit_code) {
            (true, _) => "process was terminated".to_string(),
            (false, Some(code)) => format!("process exited with code {code}"),
            (false, None) => "process ended without an exit code".to_string(),
        })
    }
}

/// Spawns external programs on behalf of a session.
///
/// Two strategies implement it: [`super::SystemProcessGateway`] runs the
/// real program, [`super::SimulatedProcessGateway`] answers with clearly
/// labelled synthetic output when the program is unavailable. The choice is
/// made once, in [`super::select_gateway`].
#[async_trait]
pub trait ProcessGateway: Send + Sync {
    fn is_simulated(&self) -> bool;

    /// Runs `request` in the directory and environment of `context`.
    ///
    /// Stdout and stderr chunks are published on the event bus as they
    /// arrive. When `cancel` fires the child is terminated (politely first,
    /// forcefully after the grace period) and the returned output has
    /// `killed = true`.
    ///
    /// # Errors
    ///
    /// `OrbitError::Spawn` when the process cannot be created. A non-zero exit
    /// is not an error: it comes back as `success = false`.
    async fn run(
        &self,
        request: ProcessRequest,
        context: &SessionContext,
        cancel: CancellationToken,
    ) -> Result<ProcessOutput>;
}
