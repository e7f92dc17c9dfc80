//! Application layer for orbit.
//!
//! Coordinates the lower layers into the operation engine: the result cache,
//! the orchestrator, batch execution, insights and the `Engine` composition
//! root.

pub mod batch;
pub mod cache;
pub mod engine;
pub mod insights;
pub mod orchestrator;

pub use batch::{BatchExecutor, BatchItemResult, BatchOptions};
pub use cache::ResultCache;
pub use engine::Engine;
pub use insights::{BackendInsights, InsightsAggregator, InsightsReport, StatusCounts};
pub use orchestrator::Orchestrator;
