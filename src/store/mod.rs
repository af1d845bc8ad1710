//! Store abstractions the engine is written against.
//!
//! Two independently consistent stores back every work: a durable record
//! store ([`WorkStore`]) and an ephemeral counter store ([`CounterStore`]).
//! Neither offers transactions spanning both, so every cross-writer
//! guarantee rests on the single-record atomic primitives defined here.

pub mod memory;

pub use memory::{MemoryCounterStore, MemoryWorkStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::*;

/// Durable per-work record store.
#[async_trait]
pub trait WorkStore: Send + Sync {
    /// Insert a new record. The id must not exist yet.
    async fn insert(&self, work: &Work) -> Result<()>;

    async fn get(&self, id: &WorkId) -> Result<Option<Work>>;

    /// One page of records matching `query`, in query order.
    async fn paginate(&self, query: &WorkQuery) -> Result<Vec<Work>>;

    /// Apply `patch` to one record as a single atomic read-modify-write.
    /// Returns `None` if the record does not exist.
    async fn apply(&self, id: &WorkId, patch: &WorkPatch) -> Result<Option<PatchResult>>;

    /// Delete the given records. Missing ids are ignored.
    async fn delete(&self, ids: &[WorkId]) -> Result<u64>;
}

/// Ephemeral per-work counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn create(&self, id: &WorkId, expected: i64, processed: i64) -> Result<()>;

    /// Atomically add one to `processed` and report whether it now equals
    /// `expected`. `None` if no counter exists for `id`.
    async fn increment_and_compare(&self, id: &WorkId) -> Result<Option<CounterTick>>;

    async fn get(&self, id: &WorkId) -> Result<Option<CounterFigures>>;

    /// Atomically add `n` to `expected`, returning the new value.
    /// `None` if no counter exists for `id`.
    async fn add_expected(&self, id: &WorkId, n: u32) -> Result<Option<i64>>;

    /// Delete counters. Missing ids are ignored.
    async fn delete(&self, ids: &[WorkId]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// Finalization data carried by a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub count: i64,
    pub at: DateTime<Utc>,
}

/// A partial update applied atomically to one work record.
///
/// Semantics (shared by every store):
/// - status never regresses; `received` promotes `Waiting` to `InProgress`;
/// - `received_time` and `processed_time` keep their first value;
/// - `completion` only applies while the status is not yet `Complete`;
/// - `message` / `error` are appended at the end of their log;
/// - `updated_at` becomes `touched_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkPatch {
    pub received: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completion: Option<Completion>,
    pub message: Option<LogEntry>,
    pub error: Option<LogEntry>,
    pub touched_at: DateTime<Utc>,
}

impl WorkPatch {
    /// A patch that only touches `updated_at`.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            received: None,
            processed_at: None,
            completion: None,
            message: None,
            error: None,
            touched_at: now,
        }
    }

    pub fn received(mut self) -> Self {
        self.received = Some(self.touched_at);
        self
    }

    pub fn processed(mut self) -> Self {
        self.processed_at = Some(self.touched_at);
        self
    }

    pub fn complete(mut self, count: i64) -> Self {
        self.completion = Some(Completion {
            count,
            at: self.touched_at,
        });
        self
    }

    pub fn message(mut self, entry: LogEntry) -> Self {
        self.message = Some(entry);
        self
    }

    pub fn error(mut self, entry: LogEntry) -> Self {
        self.error = Some(entry);
        self
    }

    /// Apply to an in-memory record. Returns the status before the patch.
    pub fn apply_to(&self, work: &mut Work) -> WorkStatus {
        let previous = work.status;

        if let Some(at) = self.received {
            if work.status == WorkStatus::Waiting {
                work.status = WorkStatus::InProgress;
            }
            work.received_time.get_or_insert(at);
        }

        if let Some(at) = self.processed_at {
            work.processed_time.get_or_insert(at);
        }

        if let Some(completion) = self.completion
            && previous != WorkStatus::Complete
        {
            work.status = WorkStatus::Complete;
            work.completed_count = Some(completion.count);
            work.completed_time = Some(completion.at);
        }

        if let Some(ref entry) = self.message {
            work.messages.push(entry.clone());
        }
        if let Some(ref entry) = self.error {
            work.errors.push(entry.clone());
        }

        work.updated_at = self.touched_at;
        previous
    }
}

/// Outcome of an applied patch.
#[derive(Debug, Clone)]
pub struct PatchResult {
    pub work: Work,
    pub previous_status: WorkStatus,
}

impl PatchResult {
    /// This very write moved the work to `Complete`.
    pub fn finalized(&self) -> bool {
        self.previous_status != WorkStatus::Complete && self.work.is_complete()
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Conjunctive filters over work records.
#[derive(Debug, Clone, Default)]
pub struct WorkFilter {
    pub connector_id: Option<String>,
    pub source_id: Option<String>,
    pub work_type: Option<ConnectorType>,
    pub status: Option<WorkStatus>,
    /// Only works completed at or before this instant.
    pub completed_before: Option<DateTime<Utc>>,
}

impl WorkFilter {
    pub fn matches(&self, work: &Work) -> bool {
        self.connector_id
            .as_ref()
            .is_none_or(|c| *c == work.connector_id)
            && self.source_id.as_ref().is_none_or(|s| *s == work.source_id)
            && self.work_type.is_none_or(|t| t == work.work_type)
            && self.status.is_none_or(|s| s == work.status)
            && self
                .completed_before
                .is_none_or(|h| work.completed_time.is_some_and(|t| t <= h))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOrderField {
    Timestamp,
    /// Records without a completion time are never returned under this order.
    CompletedTime,
}

impl WorkOrderField {
    pub fn sort_value(self, work: &Work) -> Option<DateTime<Utc>> {
        match self {
            WorkOrderField::Timestamp => Some(work.timestamp),
            WorkOrderField::CompletedTime => work.completed_time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderMode {
    Asc,
    Desc,
}

/// Keyset position: the sort value and id of the last record of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkCursor {
    pub sort: DateTime<Utc>,
    pub id: WorkId,
}

impl WorkCursor {
    pub fn after(work: &Work, field: WorkOrderField) -> Option<Self> {
        field.sort_value(work).map(|sort| Self {
            sort,
            id: work.id.clone(),
        })
    }
}

/// A page request against a [`WorkStore`].
#[derive(Debug, Clone)]
pub struct WorkQuery {
    pub filter: WorkFilter,
    pub order_by: WorkOrderField,
    pub order: OrderMode,
    pub first: usize,
    pub after: Option<WorkCursor>,
}

impl WorkQuery {
    /// Newest first by creation time.
    pub fn new(filter: WorkFilter, first: usize) -> Self {
        Self {
            filter,
            order_by: WorkOrderField::Timestamp,
            order: OrderMode::Desc,
            first,
            after: None,
        }
    }

    pub fn order_by(mut self, field: WorkOrderField, order: OrderMode) -> Self {
        self.order_by = field;
        self.order = order;
        self
    }

    pub fn after(mut self, cursor: Option<WorkCursor>) -> Self {
        self.after = cursor;
        self
    }

    /// Does `work` sort strictly past the cursor in this query's order?
    pub fn is_past_cursor(&self, work: &Work) -> bool {
        let Some(ref cursor) = self.after else {
            return true;
        };
        let Some(sort) = self.order_by.sort_value(work) else {
            return false;
        };
        let key = (sort, &work.id);
        let at = (cursor.sort, &cursor.id);
        match self.order {
            OrderMode::Asc => key > at,
            OrderMode::Desc => key < at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn work(status: WorkStatus) -> Work {
        let now = Utc::now();
        Work {
            id: WorkId::from("w-1"),
            timestamp: now,
            name: "report.pdf".to_string(),
            work_type: ConnectorType::InternalImportFile,
            source_id: "file-1".to_string(),
            user_id: "user-1".to_string(),
            connector_id: "conn-1".to_string(),
            status,
            updated_at: now,
            received_time: None,
            processed_time: None,
            completed_time: None,
            completed_count: None,
            messages: Vec::new(),
            errors: Vec::new(),
        }
    }

    #[test]
    fn received_promotes_waiting_and_keeps_first_time() {
        let mut w = work(WorkStatus::Waiting);
        let first = Utc::now();
        WorkPatch::at(first).received().apply_to(&mut w);
        assert_eq!(w.status, WorkStatus::InProgress);
        assert_eq!(w.received_time, Some(first));

        let later = first + Duration::seconds(5);
        WorkPatch::at(later).received().apply_to(&mut w);
        assert_eq!(w.received_time, Some(first));
        assert_eq!(w.updated_at, later);
    }

    #[test]
    fn completion_applies_once() {
        let mut w = work(WorkStatus::InProgress);
        let t1 = Utc::now();
        let previous = WorkPatch::at(t1).complete(3).apply_to(&mut w);
        assert_eq!(previous, WorkStatus::InProgress);
        assert_eq!(w.status, WorkStatus::Complete);
        assert_eq!(w.completed_count, Some(3));

        let t2 = t1 + Duration::seconds(1);
        let previous = WorkPatch::at(t2).complete(4).apply_to(&mut w);
        assert_eq!(previous, WorkStatus::Complete);
        assert_eq!(w.completed_count, Some(3));
        assert_eq!(w.completed_time, Some(t1));
    }

    #[test]
    fn received_after_completion_does_not_regress() {
        let mut w = work(WorkStatus::Complete);
        WorkPatch::at(Utc::now()).received().apply_to(&mut w);
        assert_eq!(w.status, WorkStatus::Complete);
    }

    #[test]
    fn logs_append_in_order() {
        let mut w = work(WorkStatus::InProgress);
        let now = Utc::now();
        WorkPatch::at(now)
            .message(LogEntry::new(now, "one"))
            .apply_to(&mut w);
        WorkPatch::at(now)
            .message(LogEntry::new(now, "two"))
            .error(LogEntry::new(now, "bad").with_source("w2"))
            .apply_to(&mut w);
        let texts: Vec<_> = w.messages.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, ["one", "two"]);
        assert_eq!(w.errors.len(), 1);
    }

    #[test]
    fn completed_before_excludes_unfinished_works() {
        let horizon = Utc::now();
        let filter = WorkFilter {
            completed_before: Some(horizon),
            ..Default::default()
        };
        let mut w = work(WorkStatus::InProgress);
        assert!(!filter.matches(&w));
        w.completed_time = Some(horizon - Duration::days(1));
        assert!(filter.matches(&w));
        w.completed_time = Some(horizon + Duration::days(1));
        assert!(!filter.matches(&w));
    }
}
