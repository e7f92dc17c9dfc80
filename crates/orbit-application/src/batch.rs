use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use orbit_core::error::OrbitError;
use orbit_core::operation::{ExecuteOptions, OperationOutput, OperationRequest};

use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Dispatch every operation concurrently
    pub parallel: bool,
    /// Sequential mode only: stop at the first failure
    pub stop_on_error: bool,
}

/// Outcome of one batch entry, attributed to its position in the input.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResult {
    pub index: usize,
    pub request: OperationRequest,
    /// `None` when served from cache or rejected before an operation existed
    pub operation_id: Option<String>,
    pub success: bool,
    pub result: Option<OperationOutput>,
    pub error: Option<String>,
    pub from_cache: bool,
}

/// Runs lists of operations through the orchestrator.
#[derive(Clone)]
pub struct BatchExecutor {
    orchestrator: Arc<Orchestrator>,
}

impl BatchExecutor {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Runs `requests` and returns one result per attempted entry, in input
    /// order.
    ///
    /// In parallel mode every entry is attempted and one failure never
    /// affects its siblings. In sequential mode with `stop_on_error`, entries
    /// after the first failure are not attempted and have no result.
    pub async fn execute_batch(
        &self,
        requests: Vec<OperationRequest>,
        options: BatchOptions,
    ) -> Vec<BatchItemResult> {
        tracing::info!(
            "[BatchExecutor] Running {} operations ({}, stop_on_error: {})",
            requests.len(),
            if options.parallel { "parallel" } else { "sequential" },
            options.stop_on_error
        );

        if options.parallel {
            let runs = requests
                .into_iter()
                .enumerate()
                .map(|(index, request)| self.run_one(index, request));
            return join_all(runs).await;
        }

        let mut results = Vec::with_capacity(requests.len());
        for (index, request) in requests.into_iter().enumerate() {
            let item = self.run_one(index, request).await;
            let failed = !item.success;
            results.push(item);
            if failed && options.stop_on_error {
                tracing::warn!(
                    "[BatchExecutor] Stopping after failure at index {}",
                    index
                );
                break;
            }
        }
        results
    }

    async fn run_one(&self, index: usize, request: OperationRequest) -> BatchItemResult {
        let outcome = self
            .orchestrator
            .execute(request.clone(), ExecuteOptions::default())
            .await;
        match outcome {
            Ok(response) => BatchItemResult {
                index,
                request,
                success: response.is_success(),
                operation_id: response.operation_id,
                result: response.result,
                error: response.error,
                from_cache: response.from_cache,
            },
            Err(e) => BatchItemResult {
                index,
                request,
                // Timed-out and cancelled operations stay in history.
                operation_id: match &e {
                    OrbitError::Timeout { operation_id, .. }
                    | OrbitError::Cancelled { operation_id } => Some(operation_id.clone()),
                    _ => None,
                },
                success: false,
                result: None,
                error: Some(e.to_string()),
                from_cache: false,
            },
        }
    }
}
