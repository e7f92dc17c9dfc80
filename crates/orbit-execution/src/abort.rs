//! Abort/timeout controller.
//!
//! One controller per operation. Firing the deadline and an explicit cancel
//! are the same signal; only the recorded [`CancelReason`] differs, and the
//! first reason recorded wins.

use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use orbit_core::operation::CancelReason;

#[derive(Debug, Clone)]
pub struct AbortController {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
    timeout: Duration,
    deadline: Instant,
}

impl AbortController {
    /// Starts the clock: the deadline is `timeout` from now.
    pub fn new(timeout: Duration) -> Self {
        Self::with_token(CancellationToken::new(), timeout)
    }

    /// Uses `token` as the abort signal, typically a child of a session token.
    pub fn with_token(token: CancellationToken, timeout: Duration) -> Self {
        Self {
            token,
            reason: Arc::new(OnceLock::new()),
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Signals the abort. Returns `false` if another reason was recorded first.
    pub fn abort(&self, reason: CancelReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The recorded reason. A token cancelled from outside (parent token)
    /// without an explicit reason counts as session termination.
    pub fn reason(&self) -> Option<CancelReason> {
        match self.reason.get() {
            Some(reason) => Some(*reason),
            None if self.token.is_cancelled() => Some(CancelReason::SessionTerminated),
            None => None,
        }
    }
}
