//! Backend identifiers, the adapter seam and the adapter registry.

mod adapter;
mod id;
mod registry;

pub use adapter::{BackendAdapter, ConnectionState, DispatchContext};
pub use id::{BackendId, OperationType};
pub use registry::BackendRegistry;
