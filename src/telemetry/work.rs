//! Span helpers for work reporting and retention.

use tracing::Span;

use crate::model::WorkId;

/// Start a span for one progress report against a work.
///
/// `work.completed_count` is declared empty and filled by
/// [`record_finalization`] when the report finalizes the work.
pub fn start_report_span(kind: &str, work_id: &WorkId) -> Span {
    tracing::info_span!(
        "work.report",
        "work.report.kind" = kind,
        "work.id" = %work_id,
        "work.completed_count" = tracing::field::Empty,
    )
}

/// Record that the current report finalized the work.
pub fn record_finalization(span: &Span, completed_count: i64) {
    span.record("work.completed_count", completed_count);
    span.in_scope(|| {
        tracing::info!(completed_count, "work finalized");
    });
}

/// Start a span for one retention scan over a connector's works.
pub fn start_retention_span(connector_id: &str, retention_days: i64) -> Span {
    tracing::info_span!(
        "work.retention",
        "connector.id" = connector_id,
        "work.retention.days" = retention_days,
        "work.retention.deleted" = tracing::field::Empty,
    )
}
