//! Engine events and the typed publish/subscribe bus.
//!
//! Every event belongs to exactly one [`EventChannel`]; ordering is
//! guaranteed per channel only.

mod bus;

pub use bus::{EventBus, EventSubscription, DEFAULT_CHANNEL_CAPACITY};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::backend::BackendId;
use crate::operation::{CancelReason, OperationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventChannel {
    /// Process stdout/stderr chunks
    Output,
    /// Process, operation and session lifecycle
    Lifecycle,
    /// Filesystem watcher notifications
    FileSystem,
    /// Engine log records mirrored from tracing
    Log,
}

impl EventChannel {
    pub const ALL: [EventChannel; 4] = [
        EventChannel::Output,
        EventChannel::Lifecycle,
        EventChannel::FileSystem,
        EventChannel::Log,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A filesystem change notification. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileChangeKind,
    pub timestamp: DateTime<Utc>,
}

impl FileEvent {
    pub fn new(path: impl Into<PathBuf>, kind: FileChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// A tracing record forwarded onto the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub target: String,
    pub level: String,
    pub message: String,
    pub fields: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// Everything the engine publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    OutputChunk {
        operation_id: Option<String>,
        stream: OutputStream,
        chunk: String,
    },
    ProcessStarted {
        operation_id: Option<String>,
        program: String,
        pid: Option<u32>,
    },
    ProcessExited {
        operation_id: Option<String>,
        exit_code: Option<i32>,
        duration_ms: u64,
    },
    OperationStatusChanged {
        operation_id: String,
        backend: BackendId,
        status: OperationStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cancel_reason: Option<CancelReason>,
    },
    SessionStarted {
        session_id: String,
        working_dir: PathBuf,
        version: Option<String>,
        simulated: bool,
    },
    DirectoryChanged {
        session_id: String,
        from: PathBuf,
        to: PathBuf,
    },
    SessionTerminated {
        session_id: String,
    },
    FileChanged(FileEvent),
    Log(LogRecord),
}

impl EngineEvent {
    pub fn channel(&self) -> EventChannel {
        match self {
            EngineEvent::OutputChunk { .. } => EventChannel::Output,
            EngineEvent::ProcessStarted { .. }
            | EngineEvent::ProcessExited { .. }
            | EngineEvent::OperationStatusChanged { .. }
            | EngineEvent::SessionStarted { .. }
            | EngineEvent::DirectoryChanged { .. }
            | EngineEvent::SessionTerminated { .. } => EventChannel::Lifecycle,
            EngineEvent::FileChanged(_) => EventChannel::FileSystem,
            EngineEvent::Log(_) => EventChannel::Log,
        }
    }
}
