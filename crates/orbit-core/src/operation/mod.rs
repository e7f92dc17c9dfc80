//! Operation domain module.
//!
//! - `model`: the tracked `Operation` and its status machine
//! - `request`: what callers submit (`OperationRequest`, `ExecuteOptions`)
//! - `output`: what backends return (`OperationOutput`)
//! - `cache_key`: deterministic keys for the result cache

mod cache_key;
mod model;
mod output;
mod request;

pub use cache_key::CacheKey;
pub use model::{CancelReason, Operation, OperationStatus};
pub use output::OperationOutput;
pub use request::{ExecuteOptions, OperationRequest, Parameters};

use serde::Serialize;

/// Returned by the orchestrator for every non-erroring `execute`.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteResponse {
    /// `None` when served from cache: no operation was created.
    pub operation_id: Option<String>,
    pub status: OperationStatus,
    pub result: Option<OperationOutput>,
    pub error: Option<String>,
    pub from_cache: bool,
}

impl ExecuteResponse {
    pub fn cached(result: OperationOutput) -> Self {
        Self {
            operation_id: None,
            status: OperationStatus::Completed,
            result: Some(result),
            error: None,
            from_cache: true,
        }
    }

    pub fn from_operation(operation: &Operation) -> Self {
        Self {
            operation_id: Some(operation.id.clone()),
            status: operation.status,
            result: operation.result.clone(),
            error: operation.error.clone(),
            from_cache: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Completed
    }
}
