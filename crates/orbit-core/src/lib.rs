//! Domain layer of the orbit engine.
//!
//! Holds the types every other crate shares: the error type, backends and
//! their operation-type registry, the `Operation` model, sessions, engine
//! events with their bus, and configuration.

pub mod backend;
pub mod config;
pub mod error;
pub mod event;
pub mod operation;
pub mod session;

// Re-export common error type
pub use error::{OrbitError, Result};
