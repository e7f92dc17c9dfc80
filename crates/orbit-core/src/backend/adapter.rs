use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::BackendId;
use crate::error::Result;
use crate::operation::{OperationOutput, OperationRequest};

/// Reachability of a backend as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    /// No probe has run yet
    Unknown,
}

/// Per-dispatch inputs handed to an adapter.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub operation_id: String,
    /// Fired on user cancel, deadline or session termination. Adapters must
    /// stop their in-flight call (killing any child process) when it fires.
    pub cancel: CancellationToken,
}

/// A backend adapter: the CLI program or one of the pluggable servers.
///
/// Adapter-level results follow one convention: a call that ran and was
/// rejected by the backend is `Ok(OperationOutput { success: false, .. })`;
/// a call that could not be made at all (spawn failure, invalid parameters,
/// unreachable server) is `Err`.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn id(&self) -> BackendId;

    /// Last observed connection state without probing.
    async fn state(&self) -> ConnectionState;

    /// Verifies the backend is reachable, probing again when no successful
    /// check is on record. Returns `BackendUnavailable` otherwise.
    async fn ensure_connected(&self) -> Result<()>;

    /// Token whose cancellation should abort every in-flight dispatch of this
    /// backend, such as the CLI session token. `None` when the backend has
    /// no such scope.
    async fn scope_token(&self) -> Option<CancellationToken> {
        None
    }

    async fn dispatch(
        &self,
        request: OperationRequest,
        ctx: DispatchContext,
    ) -> Result<OperationOutput>;
}
