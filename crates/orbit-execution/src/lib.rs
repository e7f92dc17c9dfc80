//! Execution layer: the per-operation abort/timeout controller, the
//! deadline-bounded dispatch built on it, and the tracing layer that mirrors
//! engine logs onto the event bus.

pub mod abort;
pub mod dispatch;
pub mod tracing_layer;

pub use abort::AbortController;
pub use dispatch::{DispatchCleanup, DispatchOutcome, dispatch_with_deadline};
pub use tracing_layer::EventBusLayer;
