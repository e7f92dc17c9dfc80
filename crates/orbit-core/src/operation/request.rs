use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::backend::{BackendId, OperationType};
use crate::error::{OrbitError, Result};

/// Parameter mapping of an operation.
///
/// A `BTreeMap` keeps top-level keys ordered so identical requests serialize
/// identically.
pub type Parameters = BTreeMap<String, Value>;

/// What a caller asks the orchestrator to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub backend: BackendId,
    pub operation_type: OperationType,
    #[serde(default)]
    pub parameters: Parameters,
}

impl OperationRequest {
    pub fn new(backend: BackendId, operation_type: OperationType) -> Self {
        Self {
            backend,
            operation_type,
            parameters: Parameters::new(),
        }
    }

    /// Adds a parameter (builder style).
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Returns a string parameter or `InvalidParameter` when missing.
    pub fn required_str(&self, key: &str) -> Result<&str> {
        match self.parameters.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
            Some(Value::String(_)) => Err(OrbitError::invalid_parameter(key, "must not be empty")),
            Some(_) => Err(OrbitError::invalid_parameter(key, "must be a string")),
            None => Err(OrbitError::invalid_parameter(key, "is required")),
        }
    }

    pub fn optional_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.parameters
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn optional_u64(&self, key: &str) -> Option<u64> {
        self.parameters.get(key).and_then(Value::as_u64)
    }

    /// Rejects operation types that are not registered for the target backend.
    pub fn validate(&self) -> Result<()> {
        if self.backend.supports(self.operation_type) {
            Ok(())
        } else {
            Err(OrbitError::UnsupportedOperation {
                backend: self.backend.to_string(),
                operation: self.operation_type.to_string(),
            })
        }
    }
}

/// Per-call overrides. Unset fields fall back to the backend policy.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// `Some(false)` forces a bypass even for cacheable types
    pub use_cache: Option<bool>,
    pub ttl: Option<Duration>,
    pub timeout: Option<Duration>,
}

impl ExecuteOptions {
    pub fn no_cache() -> Self {
        Self {
            use_cache: Some(false),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}
