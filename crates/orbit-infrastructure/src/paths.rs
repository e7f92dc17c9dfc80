//! Path management for orbit configuration and logs.
//!
//! ```text
//! ~/.config/orbit/             # Config directory
//! ├── config.toml              # Engine configuration
//! └── logs/                    # Rolling log files
//!     └── orbit.log.YYYY-MM-DD
//! ```
//!
//! `ORBIT_CONFIG_DIR` overrides the config directory, which keeps tests and
//! sandboxed runs away from the user's real files.

use std::path::PathBuf;

use orbit_core::error::{OrbitError, Result};

const APP_DIR: &str = "orbit";
/// Environment variable that replaces the platform config directory.
pub const CONFIG_DIR_ENV: &str = "ORBIT_CONFIG_DIR";

pub struct OrbitPaths;

impl OrbitPaths {
    /// Returns the orbit configuration directory (e.g. `~/.config/orbit/`).
    pub fn config_dir() -> Result<PathBuf> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| OrbitError::config("Cannot find the platform config directory"))
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn log_dir() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("logs"))
    }
}
