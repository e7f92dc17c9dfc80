//! Engine configuration.
//!
//! Every field has a default so a partial (or missing) `config.toml` works:
//!
//! ```toml
//! [cli]
//! program = "claude"
//! simulate_when_unavailable = false
//!
//! [orchestrator]
//! default_timeout_ms = 60000
//!
//! [backends.web_scraper]
//! endpoint = "http://127.0.0.1:3002"
//! ttl_secs = 7200
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::backend::BackendId;

/// Directory names the watcher never reports.
pub const DEFAULT_IGNORED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    ".venv",
    "__pycache__",
    ".cache",
    "target",
];

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub cli: CliSettings,
    pub orchestrator: OrchestratorSettings,
    /// Keyed by backend id (`cli`, `web_scraper`, `browser`, `code_host`, `ide`)
    pub backends: BTreeMap<String, BackendSettings>,
    pub watcher: WatcherSettings,
    pub events: EventSettings,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct CliSettings {
    /// Program name or path of the coding assistant
    pub program: String,
    /// Arguments of the availability probe
    pub version_args: Vec<String>,
    /// Text the probe output must contain
    pub signature: String,
    /// Initial session directory; the process cwd when unset
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub extra_paths: Vec<PathBuf>,
    /// Fall back to the simulated gateway when the program cannot be found
    pub simulate_when_unavailable: bool,
    pub simulation_delay_ms: u64,
    /// Time between the polite and the forceful kill
    pub kill_grace_ms: u64,
    pub cost_per_1k_tokens: f64,
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            version_args: vec!["--version".to_string()],
            signature: "Claude Code".to_string(),
            working_dir: None,
            env: BTreeMap::new(),
            extra_paths: Vec::new(),
            simulate_when_unavailable: true,
            simulation_delay_ms: 600,
            kill_grace_ms: 2_000,
            cost_per_1k_tokens: 0.015,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub cache_enabled: bool,
    /// Timeout of the command-line backend
    pub default_timeout_ms: u64,
    /// Cache TTL of the command-line backend
    pub default_ttl_secs: u64,
    /// Terminal operations kept in history; oldest are dropped first
    pub history_limit: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            default_timeout_ms: 120_000,
            default_ttl_secs: 300,
            history_limit: 500,
        }
    }
}

/// Per-backend overrides.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct BackendSettings {
    /// Base URL of a service backend
    pub endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
    pub ttl_secs: Option<u64>,
    pub cacheable: Option<bool>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct WatcherSettings {
    /// Directory names ignored in addition to [`DEFAULT_IGNORED_DIRS`]
    pub ignore: Vec<String>,
}

impl WatcherSettings {
    pub fn ignored_names(&self) -> Vec<String> {
        DEFAULT_IGNORED_DIRS
            .iter()
            .map(|s| s.to_string())
            .chain(self.ignore.iter().cloned())
            .collect()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct EventSettings {
    pub capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            capacity: crate::event::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Resolved timeout and cache policy for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendPolicy {
    pub timeout: Duration,
    pub ttl: Duration,
    pub cacheable: bool,
}

impl BackendPolicy {
    /// Built-in defaults for the service backends: long timeouts and TTLs
    /// for content fetching, no caching and short timeouts for interactive
    /// backends. The command-line backend takes the `[orchestrator]` defaults.
    pub fn builtin(backend: BackendId) -> Self {
        let (timeout_secs, ttl_secs, cacheable) = match backend {
            BackendId::Cli => (120, 300, true),
            BackendId::WebScraper => (90, 3_600, true),
            BackendId::CodeHost => (30, 600, true),
            BackendId::Browser => (30, 0, false),
            BackendId::Ide => (10, 0, false),
        };
        Self {
            timeout: Duration::from_secs(timeout_secs),
            ttl: Duration::from_secs(ttl_secs),
            cacheable,
        }
    }
}

impl EngineConfig {
    pub fn backend(&self, backend: BackendId) -> Option<&BackendSettings> {
        self.backends.get(backend.as_ref())
    }

    /// Built-in policy with the configured overrides applied.
    pub fn policy(&self, backend: BackendId) -> BackendPolicy {
        let mut policy = BackendPolicy::builtin(backend);
        if backend == BackendId::Cli {
            policy.timeout = Duration::from_millis(self.orchestrator.default_timeout_ms);
            policy.ttl = Duration::from_secs(self.orchestrator.default_ttl_secs);
        }
        if let Some(settings) = self.backend(backend) {
            if let Some(ms) = settings.timeout_ms {
                policy.timeout = Duration::from_millis(ms);
            }
            if let Some(secs) = settings.ttl_secs {
                policy.ttl = Duration::from_secs(secs);
            }
            if let Some(cacheable) = settings.cacheable {
                policy.cacheable = cacheable;
            }
        }
        policy.cacheable &= self.orchestrator.cache_enabled;
        policy
    }

    pub fn from_toml_str(content: &str) -> crate::error::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [cli]
            program = "/opt/assistant/bin/claude"

            [backends.web_scraper]
            endpoint = "http://127.0.0.1:3002"
            ttl_secs = 7200

            [backends.browser]
            cacheable = true
            "#,
        )
        .unwrap();

        assert_eq!(config.cli.program, "/opt/assistant/bin/claude");
        assert_eq!(config.cli.version_args, vec!["--version"]);
        assert!(config.cli.simulate_when_unavailable);

        let scraper = config.policy(BackendId::WebScraper);
        assert_eq!(scraper.ttl, Duration::from_secs(7200));
        assert_eq!(scraper.timeout, Duration::from_secs(90));
        assert!(config.policy(BackendId::Browser).cacheable);
        assert!(!config.policy(BackendId::Ide).cacheable);
    }

    #[test]
    fn test_cli_policy_follows_orchestrator_defaults() {
        let mut config = EngineConfig::default();
        config.orchestrator.default_timeout_ms = 5_000;
        let policy = config.policy(BackendId::Cli);
        assert_eq!(policy.timeout, Duration::from_millis(5_000));
        assert_eq!(policy.ttl, Duration::from_secs(300));
        assert_eq!(
            config.policy(BackendId::WebScraper).timeout,
            Duration::from_secs(90)
        );
    }

    #[test]
    fn test_global_cache_switch_wins() {
        let mut config = EngineConfig::default();
        config.orchestrator.cache_enabled = false;
        assert!(!config.policy(BackendId::Cli).cacheable);
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.orchestrator.history_limit, 500);
        assert!(config.watcher.ignored_names().contains(&".git".to_string()));
    }
}
