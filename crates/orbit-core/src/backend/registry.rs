use std::collections::HashMap;
use std::sync::Arc;

use super::{BackendAdapter, BackendId};
use crate::error::{OrbitError, Result};

/// Adapters keyed by backend id.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    adapters: HashMap<BackendId, Arc<dyn BackendAdapter>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its own id, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn BackendAdapter>) {
        tracing::debug!("[Registry] Registering backend adapter: {}", adapter.id());
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn BackendAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, id: BackendId) -> Result<Arc<dyn BackendAdapter>> {
        self.adapters
            .get(&id)
            .cloned()
            .ok_or_else(|| OrbitError::UnknownBackend(id.to_string()))
    }

    pub fn ids(&self) -> Vec<BackendId> {
        let mut ids: Vec<_> = self.adapters.keys().copied().collect();
        ids.sort();
        ids
    }
}
