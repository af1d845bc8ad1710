//! Counter figures and the read-only progress views built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LogEntry, Work, WorkStatus};

/// Live counts for one work, as held by the counter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CounterFigures {
    pub expected: i64,
    pub processed: i64,
}

impl CounterFigures {
    pub fn is_complete(&self) -> bool {
        self.processed == self.expected
    }
}

/// Result of one atomic increment-and-compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterTick {
    /// This increment made processed reach expected.
    pub is_complete: bool,
    /// Processed count after the increment.
    pub total: i64,
}

/// A work merged with its live counter figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkProgress {
    pub work: Work,
    /// `None` once the counter is gone (deleted, or never written).
    pub expected: Option<i64>,
    pub processed: Option<i64>,
}

/// Lightweight file descriptor shown while an export is being produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressFile {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub upload_status: WorkStatus,
    pub meta_data: ProgressMetaData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMetaData {
    pub messages: Vec<LogEntry>,
    pub errors: Vec<LogEntry>,
}

impl From<&Work> for ProgressFile {
    fn from(work: &Work) -> Self {
        Self {
            id: work.id.to_string(),
            name: work.name.clone(),
            size: 0,
            last_modified: work.updated_at,
            upload_status: work.status,
            meta_data: ProgressMetaData {
                messages: work.messages.clone(),
                errors: work.errors.clone(),
            },
        }
    }
}
