//! Core data model.
//!
//! A work is one asynchronous job handed to a connector. It has identity,
//! provenance (user + connector), a monotonic status, and two append-only
//! logs. Live progress counts are kept next to it in the counter store.

pub mod connector;
pub mod progress;

pub use connector::{Connector, ConnectorType};
pub use progress::{CounterFigures, CounterTick, ProgressFile, ProgressMetaData, WorkProgress};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Work
// ---------------------------------------------------------------------------

/// A job tracked by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    /// Unique identifier, assigned at creation.
    pub id: WorkId,

    /// Creation time.
    pub timestamp: DateTime<Utc>,

    /// Human-readable label (usually the file or entity being processed).
    pub name: String,

    /// Category of the connector running this work.
    pub work_type: ConnectorType,

    /// Entity, file or stream the work operates on.
    pub source_id: String,

    pub user_id: String,
    pub connector_id: String,

    pub status: WorkStatus,

    /// Last mutation of the record. Heartbeats only touch this field.
    pub updated_at: DateTime<Utc>,

    pub received_time: Option<DateTime<Utc>>,
    pub processed_time: Option<DateTime<Utc>>,
    pub completed_time: Option<DateTime<Utc>>,

    /// Number of processed sub-items, written once on finalization.
    pub completed_count: Option<i64>,

    pub messages: Vec<LogEntry>,
    pub errors: Vec<LogEntry>,
}

impl Work {
    pub fn is_complete(&self) -> bool {
        self.status == WorkStatus::Complete
    }
}

/// Newtype for work IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(pub String);

impl WorkId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for WorkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a work. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    /// Created, nothing received by the connector yet.
    Waiting,
    /// The connector acknowledged the work and is processing it.
    InProgress,
    /// Finalized. Terminal.
    Complete,
}

impl WorkStatus {
    /// Can a work move from self to `to`? Staying put is always allowed.
    pub fn can_transition_to(self, to: WorkStatus) -> bool {
        use WorkStatus::*;
        self == to
            || matches!(
                (self, to),
                (Waiting, InProgress) | (Waiting, Complete) | (InProgress, Complete)
            )
    }

    pub fn is_terminal(self) -> bool {
        self == WorkStatus::Complete
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkStatus::Waiting => "waiting",
            WorkStatus::InProgress => "in_progress",
            WorkStatus::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WorkStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(WorkStatus::Waiting),
            "in_progress" => Ok(WorkStatus::InProgress),
            "complete" => Ok(WorkStatus::Complete),
            _ => Err(crate::error::Error::Other(format!("unknown work status: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Log Entry
// ---------------------------------------------------------------------------

/// One entry of a work's `messages` or `errors` log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Reporter of the error (worker, bundle element). Errors only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl LogEntry {
    pub fn new(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Error payload a worker attaches to an action report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub error: String,
    pub source: String,
}

impl ErrorData {
    pub fn new(error: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            source: source.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Creation options
// ---------------------------------------------------------------------------

/// Optional knobs for `create_work`.
#[derive(Debug, Clone, Default)]
pub struct CreateWorkOptions {
    /// The connector already acknowledged the work at this time.
    pub received_time: Option<DateTime<Utc>>,
}

impl CreateWorkOptions {
    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_time = Some(at);
        self
    }
}
