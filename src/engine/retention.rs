//! Retention: reclaim completed works past their connector's horizon.
//!
//! Keyset pagination over the expired works, newest completion first.
//! Each page's counters and records are deleted before the next page is
//! read, so memory stays bounded by the page size.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use opentelemetry::KeyValue;
use tracing::{Instrument, debug, info};

use super::WorkTracker;
use crate::error::{Error, Result};
use crate::model::*;
use crate::store::{OrderMode, WorkCursor, WorkFilter, WorkOrderField, WorkQuery};
use crate::telemetry::metrics;
use crate::telemetry::work::start_retention_span;

impl WorkTracker {
    /// Days a completed work of this connector type is kept.
    pub fn retention_days(&self, connector_type: ConnectorType) -> i64 {
        if connector_type.is_enrichment() {
            self.config.enrichment_retention_days
        } else {
            self.config.default_retention_days
        }
    }

    /// Works completed at or before this instant are expired.
    ///
    /// Fails with `Error::Config` when the retention period does not fit
    /// in the calendar range.
    pub fn retention_horizon(
        &self,
        connector_type: ConnectorType,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let days = self.retention_days(connector_type);
        Duration::try_days(days)
            .and_then(|period| now.checked_sub_signed(period))
            .ok_or_else(|| {
                Error::Config(format!(
                    "retention of {days} days for {connector_type} is out of range"
                ))
            })
    }

    /// Delete the connector's completed works older than its horizon.
    /// Returns the number of records deleted.
    pub async fn delete_old_completed_works(&self, connector: &Connector) -> Result<usize> {
        let days = self.retention_days(connector.connector_type);
        let horizon = self.retention_horizon(connector.connector_type, Utc::now())?;
        let span = start_retention_span(&connector.id, days);

        async {
            let started = Instant::now();
            let filter = WorkFilter {
                connector_id: Some(connector.id.clone()),
                status: Some(WorkStatus::Complete),
                completed_before: Some(horizon),
                ..Default::default()
            };

            let mut cursor: Option<WorkCursor> = None;
            let mut deleted = 0usize;
            loop {
                let query = WorkQuery::new(filter.clone(), self.config.retention_page_size)
                    .order_by(WorkOrderField::CompletedTime, OrderMode::Desc)
                    .after(cursor.take());
                let page = self.works.paginate(&query).await?;
                let Some(last) = page.last() else {
                    break;
                };
                cursor = WorkCursor::after(last, WorkOrderField::CompletedTime);

                let ids: Vec<WorkId> = page.iter().map(|w| w.id.clone()).collect();
                self.counters.delete(&ids).await?;
                let removed = self.works.delete(&ids).await? as usize;
                deleted += removed;
                debug!(page = ids.len(), removed, "retention page deleted");

                if cursor.is_none() {
                    break;
                }
            }

            span.record("work.retention.deleted", deleted);
            if deleted > 0 {
                info!(connector_id = %connector.id, deleted, %horizon, "expired works deleted");
                metrics::works_deleted()
                    .add(deleted as u64, &[KeyValue::new("reason", "retention")]);
            }
            metrics::operation_duration_ms().record(
                started.elapsed().as_secs_f64() * 1000.0,
                &[KeyValue::new("operation", "work.retention")],
            );
            Ok(deleted)
        }
        .instrument(span.clone())
        .await
    }

    /// Run the retention scan for a connector known to the registry.
    pub async fn purge_expired(&self, connector_id: &str) -> Result<usize> {
        let connector = self
            .connectors
            .get(connector_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("connector {connector_id}")))?;
        self.delete_old_completed_works(&connector).await
    }
}
