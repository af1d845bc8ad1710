//! Progress reporting from connectors.
//!
//! Completion is detected two ways. `report_action` increments the
//! processed counter and learns in the same atomic step whether it reached
//! the expected count. `report_processed` reads the counter separately, so
//! two reporters may both see it complete; the finalizing record write only
//! applies while the work is not yet `Complete`, which keeps it at most once.

use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::{Instrument, debug, warn};

use super::WorkTracker;
use crate::error::{Error, Result};
use crate::model::*;
use crate::store::{PatchResult, WorkPatch};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_finalization, start_report_span};

fn non_empty(message: Option<&str>) -> Option<&str> {
    message.filter(|m| !m.is_empty())
}

impl WorkTracker {
    /// The connector picked the work up.
    ///
    /// Moves `Waiting` to `InProgress`, stamps `received_time` and appends
    /// `message` if one is given, all in one atomic write.
    pub async fn report_received(&self, id: &WorkId, message: Option<&str>) -> Result<Work> {
        let span = start_report_span("received", id);
        async {
            let now = Utc::now();
            let mut patch = WorkPatch::at(now).received();
            if let Some(text) = non_empty(message) {
                patch = patch.message(LogEntry::new(now, text));
            }

            let applied = self.apply(id, &patch).await?;
            metrics::work_reports().add(1, &[KeyValue::new("kind", "received")]);
            Ok(applied.work)
        }
        .instrument(span.clone())
        .await
    }

    /// The connector finished processing.
    ///
    /// Finalizes the work if the counter shows processed == expected at
    /// the time of the read. `message` goes to `errors` when `is_error`,
    /// to `messages` otherwise.
    pub async fn report_processed(
        &self,
        id: &WorkId,
        message: Option<&str>,
        is_error: bool,
    ) -> Result<Work> {
        let span = start_report_span("processed", id);
        async {
            let now = Utc::now();
            let mut patch = WorkPatch::at(now).processed();

            match self.counters.get(id).await? {
                Some(figures) if figures.is_complete() => {
                    patch = patch.complete(figures.processed);
                }
                Some(figures) => {
                    debug!(
                        expected = figures.expected,
                        processed = figures.processed,
                        "work not complete yet"
                    );
                }
                None => warn!(work_id = %id, "no counter for work, completion cannot be detected"),
            }

            if let Some(text) = non_empty(message) {
                let entry = LogEntry::new(now, text);
                patch = if is_error {
                    patch.error(entry)
                } else {
                    patch.message(entry)
                };
            }

            let applied = self.apply(id, &patch).await?;
            metrics::work_reports().add(1, &[KeyValue::new("kind", "processed")]);
            self.note_finalization(&applied, &span, "processed");
            Ok(applied.work)
        }
        .instrument(span.clone())
        .await
    }

    /// One sub-item of the work was handled.
    ///
    /// Atomically advances the processed counter. The record is written
    /// only when that increment completed the work, or when `error` is
    /// given (appended to `errors` with its source).
    pub async fn report_action(&self, id: &WorkId, error: Option<ErrorData>) -> Result<CounterTick> {
        let span = start_report_span("action", id);
        async {
            let tick = self
                .counters
                .increment_and_compare(id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("counter for work {id}")))?;
            metrics::work_reports().add(1, &[KeyValue::new("kind", "action")]);

            if !tick.is_complete && error.is_none() {
                return Ok(tick);
            }

            let now = Utc::now();
            let mut patch = WorkPatch::at(now);
            if tick.is_complete {
                patch = patch.complete(tick.total);
            }
            if let Some(data) = error {
                patch = patch.error(LogEntry::new(now, data.error).with_source(data.source));
            }

            let applied = self.apply(id, &patch).await?;
            self.note_finalization(&applied, &span, "action");
            Ok(tick)
        }
        .instrument(span.clone())
        .await
    }

    /// Register `n` more expected sub-items. Returns the new expected count.
    ///
    /// Producers must register every sub-item before its processing can be
    /// reported, or processed may reach expected early.
    pub async fn add_expectations(&self, id: &WorkId, n: u32) -> Result<i64> {
        let expected = self
            .counters
            .add_expected(id, n)
            .await?
            .ok_or_else(|| Error::NotFound(format!("counter for work {id}")))?;
        debug!(work_id = %id, added = n, expected, "expectations registered");
        Ok(expected)
    }

    fn note_finalization(&self, applied: &PatchResult, span: &tracing::Span, path: &'static str) {
        if !applied.finalized() {
            return;
        }
        let count = applied.work.completed_count.unwrap_or_default();
        record_finalization(span, count);
        metrics::works_completed().add(1, &[KeyValue::new("path", path)]);
    }
}
