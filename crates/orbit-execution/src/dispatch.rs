//! Deadline-bounded dispatch.
//!
//! The adapter call runs in its own task and reports back through a one-shot
//! channel. The caller waits on that channel, the controller's deadline and
//! its cancellation token, whichever comes first; no status polling is
//! involved.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use orbit_core::backend::{BackendAdapter, DispatchContext};
use orbit_core::error::{OrbitError, Result};
use orbit_core::operation::{CancelReason, OperationOutput, OperationRequest};

use crate::abort::AbortController;

/// How a deadline-bounded dispatch ended.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The adapter returned before the deadline and before any abort.
    Finished(Result<OperationOutput>),
    /// The deadline fired or the controller was aborted. The adapter has been
    /// signalled; `cleanup` waits for it to release its resources.
    Aborted {
        reason: CancelReason,
        cleanup: DispatchCleanup,
    },
}

/// Handle on an aborted adapter call that may still be unwinding (for
/// example waiting for a child process to die).
#[derive(Debug)]
pub struct DispatchCleanup {
    task: JoinHandle<()>,
}

impl DispatchCleanup {
    /// Waits up to `limit` for the adapter to return, then drops the task.
    ///
    /// Returns `true` when the adapter finished on its own.
    pub async fn wait(mut self, limit: Duration) -> bool {
        match tokio::time::timeout(limit, &mut self.task).await {
            Ok(_) => true,
            Err(_) => {
                tracing::warn!(
                    "[Dispatch] Adapter did not stop within {:?} after abort, dropping task",
                    limit
                );
                self.task.abort();
                false
            }
        }
    }
}

/// Runs `request` on `adapter` under `controller`'s deadline.
pub async fn dispatch_with_deadline(
    adapter: Arc<dyn BackendAdapter>,
    request: OperationRequest,
    operation_id: String,
    controller: &AbortController,
) -> DispatchOutcome {
    let (tx, rx) = oneshot::channel();
    let ctx = DispatchContext {
        operation_id: operation_id.clone(),
        cancel: controller.token().clone(),
    };

    let task = tokio::spawn(async move {
        let result = adapter.dispatch(request, ctx).await;
        // The receiver is gone when the caller already gave up on us.
        let _ = tx.send(result);
    });

    let deadline = tokio::time::sleep_until(controller.deadline());
    tokio::pin!(deadline);

    tokio::select! {
        biased;

        _ = controller.token().cancelled() => {
            let reason = controller.reason().unwrap_or(CancelReason::User);
            tracing::debug!(operation_id = %operation_id, "[Dispatch] Aborted: {:?}", reason);
            DispatchOutcome::Aborted { reason, cleanup: DispatchCleanup { task } }
        }
        _ = &mut deadline => {
            controller.abort(CancelReason::Timeout);
            // A concurrent cancel may have recorded its reason first.
            let reason = controller.reason().unwrap_or(CancelReason::Timeout);
            tracing::debug!(
                operation_id = %operation_id,
                "[Dispatch] Deadline of {:?} exceeded",
                controller.timeout()
            );
            DispatchOutcome::Aborted { reason, cleanup: DispatchCleanup { task } }
        }
        result = rx => match result {
            Ok(result) => DispatchOutcome::Finished(result),
            Err(_) => DispatchOutcome::Finished(Err(OrbitError::internal(format!(
                "dispatch task for {operation_id} ended without a result"
            )))),
        },
    }
}
