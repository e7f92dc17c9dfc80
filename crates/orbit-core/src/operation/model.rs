//! Operation domain model.
//!
//! An `Operation` is one orchestrated, trackable unit of work dispatched to a
//! backend. Its status only moves forward:
//!
//! ```text
//! pending -> running -> completed | failed | cancelled
//! ```
//!
//! Terminal states are final; every mutator refuses to touch a terminal
//! operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::output::OperationOutput;
use super::request::{OperationRequest, Parameters};
use crate::backend::{BackendId, OperationType};
use crate::error::{OrbitError, Result};

/// Lifecycle status of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal forward step.
    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        use OperationStatus::*;
        match (self, next) {
            (Pending, Running) => true,
            // A pending operation may be cancelled before dispatch.
            (Pending, Cancelled) => true,
            (Running, Completed) | (Running, Failed) | (Running, Cancelled) => true,
            _ => false,
        }
    }
}

/// Why an operation ended up `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Explicit user-initiated abort
    User,
    /// Deadline exceeded
    Timeout,
    /// The owning session was terminated
    SessionTerminated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub backend: BackendId,
    pub operation_type: OperationType,
    pub parameters: Parameters,
    pub status: OperationStatus,
    /// Present only when completed.
    pub result: Option<OperationOutput>,
    /// Present only when failed.
    pub error: Option<String>,
    /// Present only when cancelled.
    pub cancel_reason: Option<CancelReason>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub tokens: Option<u64>,
    pub cost: Option<f64>,
}

impl Operation {
    /// Creates a `pending` operation for the given request.
    pub fn new(request: &OperationRequest) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            backend: request.backend,
            operation_type: request.operation_type,
            parameters: request.parameters.clone(),
            status: OperationStatus::Pending,
            result: None,
            error: None,
            cancel_reason: None,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            tokens: None,
            cost: None,
        }
    }

    /// The original request, used by `retry`.
    pub fn request(&self) -> OperationRequest {
        OperationRequest {
            backend: self.backend,
            operation_type: self.operation_type,
            parameters: self.parameters.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition(OperationStatus::Running)?;
        self.started_at = Utc::now();
        Ok(())
    }

    pub fn complete(&mut self, output: OperationOutput) -> Result<()> {
        self.transition(OperationStatus::Completed)?;
        self.tokens = output.tokens;
        self.cost = output.cost;
        self.result = Some(output);
        self.finish();
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(OperationStatus::Failed)?;
        self.error = Some(error.into());
        self.finish();
        Ok(())
    }

    pub fn cancel(&mut self, reason: CancelReason) -> Result<()> {
        self.transition(OperationStatus::Cancelled)?;
        self.cancel_reason = Some(reason);
        self.finish();
        Ok(())
    }

    fn transition(&mut self, next: OperationStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(OrbitError::InvalidState(format!(
                "operation {} cannot move from {:?} to {:?}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    fn finish(&mut self) {
        let now = Utc::now();
        let elapsed = (now - self.started_at).num_milliseconds().max(0) as u64;
        self.ended_at = Some(now);
        self.duration_ms = Some(elapsed);
    }
}
