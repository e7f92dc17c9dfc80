use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

/// One logical connection to the external program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub working_dir: PathBuf,
    /// Environment overrides applied on top of the inherited environment
    pub env: BTreeMap<String, String>,
    pub active: bool,
    /// Process id of the most recently spawned child
    pub pid: Option<u32>,
    pub version: Option<String>,
    /// True when invocations are served by the simulated gateway
    pub simulated: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(working_dir: PathBuf, env: BTreeMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            working_dir,
            env,
            active: true,
            pid: None,
            version: None,
            simulated: false,
            created_at: Utc::now(),
        }
    }

    /// Snapshot handed to a single invocation.
    pub fn context(&self) -> SessionContext {
        SessionContext {
            session_id: self.id.clone(),
            working_dir: self.working_dir.clone(),
            env: self.env.clone(),
        }
    }
}

/// Immutable per-invocation copy of the session's directory and environment.
///
/// Later `change_directory`/`set_env` calls never reach an invocation that
/// already took its snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub working_dir: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl SessionContext {
    /// Context for callers that run outside any session (probes, tests).
    pub fn detached(working_dir: PathBuf) -> Self {
        Self {
            session_id: String::new(),
            working_dir,
            env: BTreeMap::new(),
        }
    }
}

/// Outcome of an availability probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub available: bool,
    pub version: Option<String>,
    pub capabilities: Vec<String>,
    /// Set when the simulated gateway answered
    pub simulated: bool,
    /// Why the program is unavailable
    pub reason: Option<String>,
}

impl AvailabilityReport {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            version: None,
            capabilities: Vec::new(),
            simulated: false,
            reason: Some(reason.into()),
        }
    }
}
