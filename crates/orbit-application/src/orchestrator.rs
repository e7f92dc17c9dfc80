//! Operation orchestrator.
//!
//! Accepts typed operation requests, consults the result cache, dispatches
//! to the registered backend adapter under a deadline, records the
//! operation's lifecycle in an in-memory history and publishes every status
//! change on the event bus.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use orbit_core::backend::BackendRegistry;
use orbit_core::config::EngineConfig;
use orbit_core::error::{OrbitError, Result};
use orbit_core::event::{EngineEvent, EventBus};
use orbit_core::operation::{
    CacheKey, CancelReason, ExecuteOptions, ExecuteResponse, Operation, OperationRequest,
    OperationStatus,
};
use orbit_execution::{AbortController, DispatchOutcome, dispatch_with_deadline};

use crate::cache::ResultCache;

/// Extra time an aborted adapter gets on top of the kill grace period.
const ABORT_SETTLE_MARGIN: Duration = Duration::from_secs(1);

#[derive(Default)]
struct OrchestratorState {
    operations: HashMap<String, Operation>,
    /// Operation ids in creation order
    order: VecDeque<String>,
    /// Controllers of operations that have not reached a terminal state
    controllers: HashMap<String, AbortController>,
    /// Caller overrides each operation was submitted with, reused by `retry`
    options: HashMap<String, ExecuteOptions>,
}

impl OrchestratorState {
    fn insert(&mut self, operation: Operation, controller: AbortController, options: ExecuteOptions) {
        self.order.push_back(operation.id.clone());
        self.controllers.insert(operation.id.clone(), controller);
        self.options.insert(operation.id.clone(), options);
        self.operations.insert(operation.id.clone(), operation);
    }

    fn discard(&mut self, id: &str) {
        self.operations.remove(id);
        self.controllers.remove(id);
        self.options.remove(id);
        self.order.retain(|o| o != id);
    }

    /// Moves a still-running operation to `cancelled`. Returns the updated
    /// operation, or `None` when it is unknown or already terminal.
    fn force_cancel(&mut self, id: &str, reason: CancelReason) -> Option<Operation> {
        self.controllers.remove(id);
        let operation = self.operations.get_mut(id)?;
        if operation.is_terminal() {
            return None;
        }
        operation.cancel(reason).ok()?;
        Some(operation.clone())
    }

    /// Drops the oldest terminal operations beyond `limit`.
    fn enforce_limit(&mut self, limit: usize) {
        let terminal = self
            .operations
            .values()
            .filter(|op| op.is_terminal())
            .count();
        let mut excess = terminal.saturating_sub(limit);
        if excess == 0 {
            return;
        }
        let operations = &mut self.operations;
        let options = &mut self.options;
        self.order.retain(|id| {
            if excess > 0 && operations.get(id).is_some_and(|op| op.is_terminal()) {
                operations.remove(id);
                options.remove(id);
                excess -= 1;
                false
            } else {
                true
            }
        });
    }
}

/// How `execute` should treat an adapter error.
enum ErrorDisposition {
    /// Raised before the backend did any work; the operation is discarded.
    Discard,
    /// Interrupted by the abort signal.
    Cancel,
    /// A runtime failure recorded on the operation.
    Fail,
}

fn classify(error: &OrbitError) -> ErrorDisposition {
    match error {
        OrbitError::Spawn { .. }
        | OrbitError::BackendUnavailable { .. }
        | OrbitError::UnknownBackend(_)
        | OrbitError::UnsupportedOperation { .. }
        | OrbitError::InvalidParameter { .. } => ErrorDisposition::Discard,
        OrbitError::Cancelled { .. } => ErrorDisposition::Cancel,
        _ => ErrorDisposition::Fail,
    }
}

fn status_event(operation: &Operation) -> EngineEvent {
    EngineEvent::OperationStatusChanged {
        operation_id: operation.id.clone(),
        backend: operation.backend,
        status: operation.status,
        cancel_reason: operation.cancel_reason,
    }
}

/// Settles an operation whose `execute` future is dropped before it did.
///
/// Armed while the operation is running. Dropping it armed aborts the
/// detached dispatch task and moves the operation to `cancelled` from a
/// spawned task.
struct InFlightGuard {
    operation_id: String,
    controller: AbortController,
    state: Arc<RwLock<OrchestratorState>>,
    bus: EventBus,
    history_limit: usize,
    armed: bool,
}

impl InFlightGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.controller.abort(CancelReason::User);
        let reason = self.controller.reason().unwrap_or(CancelReason::User);
        tracing::warn!(
            operation_id = %self.operation_id,
            "[Orchestrator] Caller dropped a running operation, cancelling ({:?})",
            reason
        );

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let operation_id = std::mem::take(&mut self.operation_id);
        let state = Arc::clone(&self.state);
        let bus = self.bus.clone();
        let limit = self.history_limit;
        runtime.spawn(async move {
            let mut state = state.write().await;
            if let Some(operation) = state.force_cancel(&operation_id, reason) {
                bus.publish(status_event(&operation));
            }
            state.enforce_limit(limit);
        });
    }
}

pub struct Orchestrator {
    registry: BackendRegistry,
    cache: ResultCache,
    config: EngineConfig,
    bus: EventBus,
    state: Arc<RwLock<OrchestratorState>>,
}

impl Orchestrator {
    pub fn new(registry: BackendRegistry, config: EngineConfig, bus: EventBus) -> Self {
        Self {
            registry,
            cache: ResultCache::new(),
            config,
            bus,
            state: Arc::new(RwLock::new(OrchestratorState::default())),
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Runs one operation.
    ///
    /// Completed and failed operations come back as `Ok` with the terminal
    /// status. Errors are returned for conditions that prevent the
    /// operation from running (unknown backend, unsupported type, backend
    /// unavailable, spawn failure, invalid parameters; none of these leave a
    /// history entry) and for timeouts and cancellations, whose operation
    /// stays in history as `cancelled`.
    ///
    /// Dropping the returned future while the operation runs cancels it.
    pub async fn execute(
        &self,
        request: OperationRequest,
        options: ExecuteOptions,
    ) -> Result<ExecuteResponse> {
        request.validate()?;
        let adapter = self.registry.get(request.backend)?;
        let policy = self.config.policy(request.backend);

        let use_cache = options.use_cache.unwrap_or(true)
            && policy.cacheable
            && request.operation_type.cacheable_by_policy();
        let key = use_cache.then(|| CacheKey::derive(&request));

        if let Some(key) = &key {
            if let Some(hit) = self.cache.get(key).await {
                tracing::debug!(
                    backend = %request.backend,
                    "[Orchestrator] Cache hit for {}",
                    request.operation_type
                );
                return Ok(ExecuteResponse::cached(hit));
            }
        }

        adapter.ensure_connected().await?;

        let timeout = options.timeout.unwrap_or(policy.timeout);
        let token = match adapter.scope_token().await {
            Some(scope) => scope.child_token(),
            None => CancellationToken::new(),
        };
        let controller = AbortController::with_token(token, timeout);

        let mut operation = Operation::new(&request);
        let operation_id = operation.id.clone();
        self.announce(&operation);
        operation.start()?;
        // Recorded before `running` is published so listeners can cancel it.
        let running = operation.clone();
        self.state
            .write()
            .await
            .insert(operation, controller.clone(), options.clone());
        let mut guard = InFlightGuard {
            operation_id: operation_id.clone(),
            controller: controller.clone(),
            state: Arc::clone(&self.state),
            bus: self.bus.clone(),
            history_limit: self.config.orchestrator.history_limit,
            armed: true,
        };
        self.announce(&running);

        tracing::info!(
            operation_id = %operation_id,
            backend = %request.backend,
            "[Orchestrator] Running {} (timeout {:?})",
            request.operation_type,
            timeout
        );

        let outcome =
            dispatch_with_deadline(adapter, request.clone(), operation_id.clone(), &controller)
                .await;

        match outcome {
            DispatchOutcome::Finished(Ok(output)) if output.success => {
                let response = self
                    .finish(&mut guard, |op| op.complete(output.clone()))
                    .await?;
                if let Some(key) = key {
                    let ttl = options.ttl.unwrap_or(policy.ttl);
                    self.cache.set(key, output, ttl).await;
                }
                Ok(response)
            }
            DispatchOutcome::Finished(Ok(output)) => {
                let message = output.error_message();
                tracing::warn!(
                    operation_id = %operation_id,
                    "[Orchestrator] {} failed: {}",
                    request.operation_type,
                    message
                );
                self.finish(&mut guard, |op| op.fail(message)).await
            }
            DispatchOutcome::Finished(Err(e)) => match classify(&e) {
                ErrorDisposition::Discard => {
                    tracing::error!(
                        operation_id = %operation_id,
                        "[Orchestrator] {} could not run: {}",
                        request.operation_type,
                        e
                    );
                    self.state.write().await.discard(&operation_id);
                    guard.disarm();
                    // Listeners saw it start; close it for them even though
                    // history forgets it.
                    self.bus.publish(EngineEvent::OperationStatusChanged {
                        operation_id: operation_id.clone(),
                        backend: request.backend,
                        status: OperationStatus::Failed,
                        cancel_reason: None,
                    });
                    Err(e)
                }
                ErrorDisposition::Cancel => {
                    let reason = controller.reason().unwrap_or(CancelReason::User);
                    self.finish(&mut guard, |op| op.cancel(reason)).await?;
                    Err(self.abort_error(&operation_id, reason, timeout))
                }
                ErrorDisposition::Fail => {
                    let message = e.to_string();
                    self.finish(&mut guard, |op| op.fail(message)).await
                }
            },
            DispatchOutcome::Aborted { reason, cleanup } => {
                tracing::warn!(
                    operation_id = %operation_id,
                    "[Orchestrator] {} cancelled ({:?})",
                    request.operation_type,
                    reason
                );
                self.finish(&mut guard, |op| op.cancel(reason)).await?;
                let settle = Duration::from_millis(self.config.cli.kill_grace_ms) + ABORT_SETTLE_MARGIN;
                cleanup.wait(settle).await;
                Err(self.abort_error(&operation_id, reason, timeout))
            }
        }
    }

    /// Requests cancellation of a running operation.
    ///
    /// Returns `false` when the operation is already terminal (a no-op).
    pub async fn cancel(&self, operation_id: &str) -> Result<bool> {
        let state = self.state.read().await;
        let operation = state
            .operations
            .get(operation_id)
            .ok_or_else(|| OrbitError::not_found("operation", operation_id))?;
        if operation.is_terminal() {
            return Ok(false);
        }
        match state.controllers.get(operation_id) {
            Some(controller) => {
                tracing::info!(operation_id = %operation_id, "[Orchestrator] Cancel requested");
                controller.abort(CancelReason::User);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Cancels every running operation. Returns how many were signalled.
    pub async fn cancel_all(&self) -> usize {
        let state = self.state.read().await;
        let mut count = 0;
        for (id, controller) in &state.controllers {
            let running = state
                .operations
                .get(id)
                .is_some_and(|op| op.status == OperationStatus::Running);
            if running && controller.abort(CancelReason::User) {
                count += 1;
            }
        }
        if count > 0 {
            tracing::info!("[Orchestrator] Cancelled {} running operations", count);
        }
        count
    }

    /// Re-submits a failed or cancelled operation as a new operation, with
    /// the options it was originally submitted with.
    pub async fn retry(&self, operation_id: &str) -> Result<ExecuteResponse> {
        let (request, options) = {
            let state = self.state.read().await;
            let operation = state
                .operations
                .get(operation_id)
                .ok_or_else(|| OrbitError::not_found("operation", operation_id))?;
            match operation.status {
                OperationStatus::Failed | OperationStatus::Cancelled => (
                    operation.request(),
                    state.options.get(operation_id).cloned().unwrap_or_default(),
                ),
                status => {
                    return Err(OrbitError::InvalidState(format!(
                        "operation {operation_id} is {status:?}; only failed or cancelled operations can be retried"
                    )));
                }
            }
        };
        tracing::info!(operation_id = %operation_id, "[Orchestrator] Retrying");
        self.execute(request, options).await
    }

    pub async fn operation(&self, operation_id: &str) -> Option<Operation> {
        self.state.read().await.operations.get(operation_id).cloned()
    }

    /// All recorded operations, oldest first.
    pub async fn history(&self) -> Vec<Operation> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.operations.get(id).cloned())
            .collect()
    }

    pub async fn running(&self) -> Vec<Operation> {
        self.history()
            .await
            .into_iter()
            .filter(|op| !op.is_terminal())
            .collect()
    }

    /// Removes terminal operations from history; running ones are kept.
    /// Returns how many were removed.
    pub async fn clear_history(&self) -> usize {
        let mut state = self.state.write().await;
        let before = state.operations.len();
        state.operations.retain(|_, op| !op.is_terminal());
        let OrchestratorState {
            operations,
            order,
            options,
            ..
        } = &mut *state;
        order.retain(|id| operations.contains_key(id));
        options.retain(|id, _| operations.contains_key(id));
        before - operations.len()
    }

    /// Applies a terminal transition, publishes it and trims history.
    /// Disarms `guard` whatever the outcome.
    async fn finish<F>(&self, guard: &mut InFlightGuard, transition: F) -> Result<ExecuteResponse>
    where
        F: FnOnce(&mut Operation) -> Result<()>,
    {
        let mut state = self.state.write().await;
        guard.disarm();
        let operation_id = guard.operation_id.as_str();
        let operation = state
            .operations
            .get_mut(operation_id)
            .ok_or_else(|| OrbitError::not_found("operation", operation_id))?;
        transition(operation)?;
        let response = ExecuteResponse::from_operation(operation);
        self.announce(operation);
        state.controllers.remove(operation_id);
        state.enforce_limit(self.config.orchestrator.history_limit);
        Ok(response)
    }

    fn announce(&self, operation: &Operation) {
        self.bus.publish(status_event(operation));
    }

    fn abort_error(&self, operation_id: &str, reason: CancelReason, timeout: Duration) -> OrbitError {
        match reason {
            CancelReason::Timeout => OrbitError::Timeout {
                operation_id: operation_id.to_string(),
                after_ms: timeout.as_millis() as u64,
            },
            CancelReason::User | CancelReason::SessionTerminated => OrbitError::Cancelled {
                operation_id: operation_id.to_string(),
            },
        }
    }
}
