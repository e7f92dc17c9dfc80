//! Composition root.
//!
//! `Engine` owns one instance of every component and wires them together:
//! the event bus, the gateway chosen once for the configured program, the
//! session manager, the backend registry, the orchestrator with its cache,
//! the batch executor and the filesystem watcher. Several engines can live in
//! one process; nothing is global.

use std::path::PathBuf;
use std::sync::Arc;

use orbit_core::backend::{BackendId, BackendRegistry};
use orbit_core::config::EngineConfig;
use orbit_core::error::Result;
use orbit_core::event::{EventBus, EventChannel, EventSubscription};
use orbit_infrastructure::{FsWatcher, select_gateway};
use orbit_interaction::{CliBackend, HttpServiceBackend, SessionManager};

use crate::batch::BatchExecutor;
use crate::insights::{InsightsAggregator, InsightsReport};
use crate::orchestrator::Orchestrator;

/// Service backends that are registered when an endpoint is configured.
const SERVICE_BACKENDS: [BackendId; 4] = [
    BackendId::WebScraper,
    BackendId::Browser,
    BackendId::CodeHost,
    BackendId::Ide,
];

pub struct Engine {
    config: EngineConfig,
    bus: EventBus,
    sessions: Arc<SessionManager>,
    orchestrator: Arc<Orchestrator>,
    batch: BatchExecutor,
    watcher: FsWatcher,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let bus = EventBus::new(config.events.capacity);
        Self::with_bus(config, bus)
    }

    /// Builds the engine on an existing bus, for callers that attach
    /// listeners (such as a log layer) before any component starts.
    pub fn with_bus(config: EngineConfig, bus: EventBus) -> Result<Self> {
        let working_dir = match &config.cli.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };

        let gateway = select_gateway(&config.cli, &working_dir, bus.clone());
        let sessions = Arc::new(SessionManager::new(
            config.cli.clone(),
            gateway,
            bus.clone(),
        ));
        Ok(Self::with_registry(config, bus, sessions, |registry, config| {
            for id in SERVICE_BACKENDS {
                if let Some(endpoint) = config.backend(id).and_then(|b| b.endpoint.clone()) {
                    tracing::info!("[Engine] Registering {} at {}", id, endpoint);
                    registry.register(Arc::new(HttpServiceBackend::new(id, endpoint)));
                }
            }
        }))
    }

    /// Builds an engine around an existing session manager. `extend` may
    /// register additional adapters next to the CLI backend.
    pub fn with_registry<F>(
        config: EngineConfig,
        bus: EventBus,
        sessions: Arc<SessionManager>,
        extend: F,
    ) -> Self
    where
        F: FnOnce(&mut BackendRegistry, &EngineConfig),
    {
        let mut registry =
            BackendRegistry::new().with(Arc::new(CliBackend::new(Arc::clone(&sessions))));
        extend(&mut registry, &config);

        let orchestrator = Arc::new(Orchestrator::new(registry, config.clone(), bus.clone()));
        let batch = BatchExecutor::new(Arc::clone(&orchestrator));
        let watcher = FsWatcher::new(bus.clone(), config.watcher.ignored_names());

        Self {
            config,
            bus,
            sessions,
            orchestrator,
            batch,
            watcher,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn batch(&self) -> &BatchExecutor {
        &self.batch
    }

    pub fn watcher(&self) -> &FsWatcher {
        &self.watcher
    }

    pub fn subscribe(&self, channel: EventChannel) -> EventSubscription {
        self.bus.subscribe(channel)
    }

    pub fn watch(&self, paths: &[PathBuf]) -> Result<()> {
        self.watcher.watch(paths)
    }

    pub async fn insights(&self) -> InsightsReport {
        InsightsAggregator::compute(&self.orchestrator.history().await)
    }

    /// Cancels running operations, ends the session and drops every watch.
    pub async fn shutdown(&self) -> Result<()> {
        let cancelled = self.orchestrator.cancel_all().await;
        let session = self.sessions.terminate().await;
        self.watcher.unwatch(None)?;
        tracing::info!(
            "[Engine] Shut down (cancelled {}, session {:?})",
            cancelled,
            session
        );
        Ok(())
    }
}
