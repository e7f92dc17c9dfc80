//! Infrastructure layer: processes, the filesystem watcher and configuration
//! files.

pub mod config_service;
pub mod paths;
pub mod process;
pub mod watcher;

pub use config_service::ConfigService;
pub use paths::OrbitPaths;
pub use process::{
    ProcessGateway, ProcessOutput, ProcessRequest, SimulatedProcessGateway, SystemProcessGateway,
    select_gateway,
};
pub use watcher::FsWatcher;
