//! Error types for the orbit engine.

use serde::Serialize;
use thiserror::Error;

/// A shared error type for the entire engine.
///
/// Variants follow the failure taxonomy of the orchestration layer:
/// availability and spawn problems are raised before an operation is
/// recorded, runtime failures and timeouts end an operation that stays in
/// history.
#[derive(Error, Debug, Clone, Serialize)]
pub enum OrbitError {
    /// Target program or backend is not installed, not reachable or not authenticated
    #[error("Backend unavailable: {backend} ({reason})")]
    BackendUnavailable { backend: String, reason: String },

    /// No adapter registered under this backend id
    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    /// Operation type not in the backend's registry
    #[error("Operation '{operation}' is not supported by backend '{backend}'")]
    UnsupportedOperation { backend: String, operation: String },

    /// Process could not be created
    #[error("Failed to spawn '{program}': {message}")]
    Spawn { program: String, message: String },

    /// Non-zero exit code or backend-reported error
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Deadline exceeded while running
    #[error("Operation {operation_id} timed out after {after_ms}ms")]
    Timeout { operation_id: String, after_ms: u64 },

    /// Explicit abort
    #[error("Operation {operation_id} was cancelled")]
    Cancelled { operation_id: String },

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Requested transition or action is not valid in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Missing or malformed operation parameter
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem watch error
    #[error("Watch error: {0}")]
    Watch(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrbitError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a BackendUnavailable error
    pub fn unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Creates a Spawn error
    pub fn spawn(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Spawn {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an InvalidParameter error
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Errors raised before any operation is created.
    ///
    /// The caller should guide the user toward installation or
    /// authentication rather than retry.
    pub fn is_availability(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable { .. } | Self::UnknownBackend(_)
        )
    }

    pub fn is_spawn(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether a manual `retry` of the originating request makes sense.
    ///
    /// Runtime failures, timeouts and cancellations are eligible; availability,
    /// spawn and validation errors need the environment fixed first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Execution(_) | Self::Timeout { .. } | Self::Cancelled { .. }
        )
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for OrbitError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for OrbitError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for OrbitError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for OrbitError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for OrbitError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Conversion from String (for error messages)
impl From<String> for OrbitError {
    fn from(err: String) -> Self {
        Self::Internal(err)
    }
}

/// A type alias for `Result<T, OrbitError>`.
pub type Result<T> = std::result::Result<T, OrbitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(OrbitError::unavailable("cli", "not installed").is_availability());
        assert!(OrbitError::UnknownBackend("ftp".into()).is_availability());
        assert!(OrbitError::spawn("claude", "permission denied").is_spawn());
        assert!(!OrbitError::spawn("claude", "permission denied").is_retryable());

        let timeout = OrbitError::Timeout {
            operation_id: "op".into(),
            after_ms: 50,
        };
        assert!(timeout.is_timeout());
        assert!(timeout.is_retryable());
        assert!(OrbitError::Execution("exit 1".into()).is_retryable());
    }

    #[test]
    fn test_io_conversion_keeps_kind() {
        let err: OrbitError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        match err {
            OrbitError::Io { message } => assert!(message.contains("NotFound")),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
