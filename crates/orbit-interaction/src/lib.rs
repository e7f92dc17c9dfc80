//! Backend adapters: the command-line program behind its session manager,
//! and the HTTP service backends.

pub mod cli_args;
pub mod cli_backend;
pub mod http_backend;
pub mod session_manager;

pub use cli_backend::CliBackend;
pub use http_backend::HttpServiceBackend;
pub use session_manager::{SessionManager, parse_version};
