//! Session management for the command-line backend.
//!
//! The [`SessionManager`] owns the one current [`Session`]: its working
//! directory, environment overrides and liveness. Every invocation takes an
//! immutable [`SessionContext`] snapshot, so directory and environment changes
//! only affect dispatches that start afterwards.

use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use orbit_core::backend::{BackendId, ConnectionState};
use orbit_core::config::CliSettings;
use orbit_core::error::{OrbitError, Result};
use orbit_core::event::{EngineEvent, EventBus};
use orbit_core::session::{AvailabilityReport, Session, SessionContext};
use orbit_infrastructure::process::{ProcessGateway, ProcessRequest};

/// Upper bound for the version probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?)").expect("version regex")
});

/// Extracts the first semantic version found in probe output.
pub fn parse_version(output: &str) -> Option<String> {
    VERSION_RE
        .captures_iter(output)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| semver::Version::parse(m.as_str()).ok())
        .map(|v| v.to_string())
}

struct SessionState {
    session: Option<Session>,
    last_check: Option<AvailabilityReport>,
    /// Directory and environment used for the next session and snapshots
    working_dir: PathBuf,
    env: BTreeMap<String, String>,
    /// Parent of every dispatch token; replaced on terminate
    token: CancellationToken,
}

impl SessionState {
    fn is_ready(&self) -> bool {
        let active = self.session.as_ref().is_some_and(|s| s.active);
        let checked = self.last_check.as_ref().is_some_and(|r| r.available);
        active && checked
    }
}

/// Tracks the external program's session across invocations.
pub struct SessionManager {
    settings: CliSettings,
    gateway: Arc<dyn ProcessGateway>,
    bus: EventBus,
    state: RwLock<SessionState>,
}

impl SessionManager {
    pub fn new(settings: CliSettings, gateway: Arc<dyn ProcessGateway>, bus: EventBus) -> Self {
        let working_dir = settings
            .working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let env = settings.env.clone();

        Self {
            settings,
            gateway,
            bus,
            state: RwLock::new(SessionState {
                session: None,
                last_check: None,
                working_dir,
                env,
                token: CancellationToken::new(),
            }),
        }
    }

    pub fn settings(&self) -> &CliSettings {
        &self.settings
    }

    pub fn gateway(&self) -> &Arc<dyn ProcessGateway> {
        &self.gateway
    }

    /// Probes the program with its version query.
    ///
    /// Success requires a zero exit code and output containing the configured
    /// signature. On success a session is created if none is active.
    pub async fn check_availability(&self) -> AvailabilityReport {
        let context = self.context().await;
        let request =
            ProcessRequest::new(&self.settings.program).args(self.settings.version_args.clone());

        tracing::debug!("[SessionManager] Probing {}", self.settings.program);
        let probe = tokio::time::timeout(
            PROBE_TIMEOUT,
            self.gateway.run(request, &context, CancellationToken::new()),
        )
        .await;

        let report = match probe {
            Err(_) => AvailabilityReport::unavailable(format!(
                "version query did not finish within {}s",
                PROBE_TIMEOUT.as_secs()
            )),
            Ok(Err(e)) => AvailabilityReport::unavailable(e.to_string()),
            Ok(Ok(out)) if !out.success => AvailabilityReport::unavailable(
                out.error()
                    .unwrap_or_else(|| "version query failed".to_string()),
            ),
            Ok(Ok(out)) => {
                let text = format!("{}\n{}", out.stdout, out.stderr);
                if self.settings.signature.is_empty() || text.contains(&self.settings.signature) {
                    AvailabilityReport {
                        available: true,
                        version: parse_version(&text),
                        capabilities: BackendId::Cli
                            .operation_types()
                            .iter()
                            .map(|op| op.to_string())
                            .collect(),
                        simulated: out.simulated,
                        reason: None,
                    }
                } else {
                    AvailabilityReport::unavailable(format!(
                        "'{}' does not identify itself as {}",
                        self.settings.program, self.settings.signature
                    ))
                }
            }
        };

        if report.available {
            tracing::info!(
                "[SessionManager] {} available (version {:?}, simulated: {})",
                self.settings.program,
                report.version,
                report.simulated
            );
        } else {
            tracing::warn!(
                "[SessionManager] {} unavailable: {}",
                self.settings.program,
                report.reason.as_deref().unwrap_or("unknown reason")
            );
        }

        let started = {
            let mut state = self.state.write().await;
            state.last_check = Some(report.clone());
            if !report.available {
                None
            } else {
                match state.session.as_mut() {
                    Some(session) if session.active => {
                        session.version = report.version.clone();
                        None
                    }
                    _ => {
                        let mut session = Session::new(state.working_dir.clone(), state.env.clone());
                        session.version = report.version.clone();
                        session.simulated = report.simulated;
                        let event = EngineEvent::SessionStarted {
                            session_id: session.id.clone(),
                            working_dir: session.working_dir.clone(),
                            version: session.version.clone(),
                            simulated: session.simulated,
                        };
                        state.session = Some(session);
                        Some(event)
                    }
                }
            }
        };
        if let Some(event) = started {
            self.bus.publish(event);
        }

        report
    }

    /// Succeeds when a session is active and the last probe passed, probing
    /// again otherwise.
    pub async fn ensure_available(&self) -> Result<()> {
        if self.state.read().await.is_ready() {
            return Ok(());
        }
        let report = self.check_availability().await;
        if report.available {
            Ok(())
        } else {
            Err(OrbitError::unavailable(
                BackendId::Cli.to_string(),
                report
                    .reason
                    .unwrap_or_else(|| "availability check failed".to_string()),
            ))
        }
    }

    pub async fn connection_state(&self) -> ConnectionState {
        let state = self.state.read().await;
        match &state.last_check {
            None => ConnectionState::Unknown,
            Some(_) if state.is_ready() => ConnectionState::Connected,
            Some(_) => ConnectionState::Disconnected,
        }
    }

    pub async fn session(&self) -> Option<Session> {
        self.state.read().await.session.clone()
    }

    pub async fn last_check(&self) -> Option<AvailabilityReport> {
        self.state.read().await.last_check.clone()
    }

    /// Snapshot of directory and environment for one invocation.
    pub async fn context(&self) -> SessionContext {
        let state = self.state.read().await;
        match &state.session {
            Some(session) if session.active => session.context(),
            _ => SessionContext {
                session_id: String::new(),
                working_dir: state.working_dir.clone(),
                env: state.env.clone(),
            },
        }
    }

    /// Token that fires when the session is terminated.
    pub async fn child_token(&self) -> CancellationToken {
        self.state.read().await.token.child_token()
    }

    /// Remembers the process id of the latest invocation.
    pub async fn record_pid(&self, pid: Option<u32>) {
        if let Some(session) = self.state.write().await.session.as_mut() {
            session.pid = pid;
        }
    }

    /// Moves the session to `path`, resolved against the current directory.
    ///
    /// Operations already running keep their directory.
    pub async fn change_directory(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let (session_id, from, to) = {
            let mut state = self.state.write().await;
            let target = state.working_dir.join(path.as_ref());
            if !target.is_dir() {
                return Err(OrbitError::invalid_parameter(
                    "path",
                    format!("{} is not a directory", target.display()),
                ));
            }
            let target = std::fs::canonicalize(&target)?;
            let from = std::mem::replace(&mut state.working_dir, target.clone());
            let session_id = match state.session.as_mut() {
                Some(session) => {
                    session.working_dir = target.clone();
                    session.id.clone()
                }
                None => String::new(),
            };
            (session_id, from, target)
        };

        tracing::info!("[SessionManager] Working directory {:?} -> {:?}", from, to);
        self.bus.publish(EngineEvent::DirectoryChanged {
            session_id,
            from,
            to: to.clone(),
        });
        Ok(to)
    }

    pub async fn set_env(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        let mut state = self.state.write().await;
        state.env.insert(key.clone(), value.clone());
        if let Some(session) = state.session.as_mut() {
            session.env.insert(key, value);
        }
    }

    pub async fn remove_env(&self, key: &str) -> Option<String> {
        let mut state = self.state.write().await;
        if let Some(session) = state.session.as_mut() {
            session.env.remove(key);
        }
        state.env.remove(key)
    }

    /// Marks the session inactive and stops every invocation it started.
    ///
    /// The next dispatch probes availability again and opens a new session.
    /// Returns the id of the terminated session, if one was active.
    pub async fn terminate(&self) -> Option<String> {
        let terminated = {
            let mut state = self.state.write().await;
            let old = std::mem::replace(&mut state.token, CancellationToken::new());
            old.cancel();
            state.last_check = None;
            match state.session.as_mut() {
                Some(session) if session.active => {
                    session.active = false;
                    session.pid = None;
                    Some(session.id.clone())
                }
                _ => None,
            }
        };

        if let Some(session_id) = &terminated {
            tracing::info!("[SessionManager] Session {} terminated", session_id);
            self.bus.publish(EngineEvent::SessionTerminated {
                session_id: session_id.clone(),
            });
        }
        terminated
    }
}
