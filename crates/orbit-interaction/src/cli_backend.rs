//! The command-line program as a backend adapter.

use async_trait::async_trait;
use std::sync::Arc;

use orbit_core::backend::{BackendAdapter, BackendId, ConnectionState, DispatchContext};
use orbit_core::error::Result;
use orbit_core::operation::{OperationOutput, OperationRequest};
use orbit_infrastructure::process::ProcessRequest;
use tokio_util::sync::CancellationToken;

use crate::cli_args::{build_invocation, estimate_usage};
use crate::session_manager::SessionManager;

/// Runs command-line operations through the session's process gateway.
pub struct CliBackend {
    sessions: Arc<SessionManager>,
}

impl CliBackend {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }
}

#[async_trait]
impl BackendAdapter for CliBackend {
    fn id(&self) -> BackendId {
        BackendId::Cli
    }

    async fn state(&self) -> ConnectionState {
        self.sessions.connection_state().await
    }

    async fn ensure_connected(&self) -> Result<()> {
        self.sessions.ensure_available().await
    }

    async fn scope_token(&self) -> Option<CancellationToken> {
        Some(self.sessions.child_token().await)
    }

    async fn dispatch(
        &self,
        request: OperationRequest,
        ctx: DispatchContext,
    ) -> Result<OperationOutput> {
        let invocation = build_invocation(&request)?;
        let settings = self.sessions.settings();
        let context = self.sessions.context().await;

        let mut process = ProcessRequest::new(&settings.program)
            .args(invocation.args.clone())
            .operation_id(&ctx.operation_id);
        if let Some(input) = invocation.stdin.clone() {
            process = process.stdin(input);
        }

        // `ctx.cancel` descends from `scope_token`, so session termination
        // reaches the process through it.
        let out = self
            .sessions
            .gateway()
            .run(process, &context, ctx.cancel.clone())
            .await?;

        self.sessions.record_pid(out.pid).await;

        let duration_ms = out.duration.as_millis() as u64;
        let mut output = if out.success {
            OperationOutput::success(out.stdout.clone(), duration_ms)
        } else {
            let mut failed = OperationOutput::failure(
                out.error().unwrap_or_default(),
                duration_ms,
            );
            failed.output = out.stdout.clone();
            failed
        };
        if let Some(code) = out.exit_code {
            output = output.with_exit_code(code);
        }

        output.simulated = out.simulated;
        if !out.simulated {
            let (tokens, cost) = estimate_usage(
                invocation.input_chars(),
                out.stdout.chars().count(),
                settings.cost_per_1k_tokens,
            );
            output = output.with_usage(tokens, cost);
        }

        tracing::debug!(
            operation_id = %ctx.operation_id,
            "[CliBackend] {} finished: success={} exit={:?}",
            request.operation_type,
            output.success,
            output.exit_code
        );
        Ok(output)
    }
}
