//! Session domain module.
//!
//! - `model`: `Session`, its per-invocation `SessionContext` snapshot and the
//!   `AvailabilityReport` produced by probes
//! - `env`: search-path construction and program resolution

mod env;
mod model;

pub use env::{build_search_path, resolve_program};
pub use model::{AvailabilityReport, Session, SessionContext};
