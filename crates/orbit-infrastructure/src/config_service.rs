//! Configuration service.
//!
//! Loads [`EngineConfig`] from `config.toml` and caches it. A missing file is
//! not an error: the defaults are used until the user writes one.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use orbit_core::config::EngineConfig;
use orbit_core::error::{OrbitError, Result};

use crate::paths::OrbitPaths;

/// Loads and caches the engine configuration.
#[derive(Debug, Clone)]
pub struct ConfigService {
    /// Explicit file; the platform config file when `None`
    path: Option<PathBuf>,
    config: Arc<RwLock<Option<EngineConfig>>>,
}

impl ConfigService {
    /// Uses the platform config file. Loading is lazy.
    pub fn new() -> Self {
        Self {
            path: None,
            config: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            config: Arc::new(RwLock::new(None)),
        }
    }

    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => OrbitPaths::config_file(),
        }
    }

    /// Gets the configuration, loading it from file if not cached.
    pub fn get_config(&self) -> Result<EngineConfig> {
        {
            let cached = self
                .config
                .read()
                .map_err(|_| OrbitError::internal("config cache lock poisoned"))?;
            if let Some(config) = cached.as_ref() {
                return Ok(config.clone());
            }
        }

        let loaded = Self::load_from(&self.config_path()?)?;

        let mut cached = self
            .config
            .write()
            .map_err(|_| OrbitError::internal("config cache lock poisoned"))?;
        *cached = Some(loaded.clone());
        Ok(loaded)
    }

    /// Forces a reload on next access.
    pub fn invalidate_cache(&self) {
        if let Ok(mut cached) = self.config.write() {
            *cached = None;
        }
    }

    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load_from(path: &Path) -> Result<EngineConfig> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                tracing::debug!("[ConfigService] Loaded {:?}", path);
                EngineConfig::from_toml_str(&content).map_err(|e| {
                    OrbitError::config(format!("Failed to parse {}: {}", path.display(), e))
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("[ConfigService] {:?} not found, using defaults", path);
                Ok(EngineConfig::default())
            }
            Err(e) => Err(OrbitError::io(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Writes `config` to the service's file and replaces the cached copy.
    pub fn save(&self, config: &EngineConfig) -> Result<PathBuf> {
        let path = self.config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(config)?;
        std::fs::write(&path, content)?;
        tracing::info!("[ConfigService] Saved configuration to {:?}", path);

        if let Ok(mut cached) = self.config.write() {
            *cached = Some(config.clone());
        }
        Ok(path)
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}
