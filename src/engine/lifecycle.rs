//! Creation, heartbeat and deletion of works.

use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::{error, info, warn};

use super::WorkTracker;
use crate::error::{Error, Result};
use crate::model::*;
use crate::store::{WorkFilter, WorkPatch, WorkQuery};
use crate::telemetry::metrics;

impl WorkTracker {
    /// Create a work for `connector`.
    ///
    /// Runs the connector's retention scan first, then writes the counter
    /// and the record. If the record cannot be written the counter is
    /// removed again; if that also fails the caller gets `OrphanRisk`.
    pub async fn create_work(
        &self,
        user_id: &str,
        connector: &Connector,
        name: &str,
        source_id: &str,
        options: CreateWorkOptions,
    ) -> Result<Work> {
        self.delete_old_completed_works(connector).await?;

        let id = self.ids.new_work_id();
        let now = Utc::now();
        let status = if options.received_time.is_some() {
            WorkStatus::InProgress
        } else {
            WorkStatus::Waiting
        };

        let work = Work {
            id: id.clone(),
            timestamp: now,
            name: name.to_string(),
            work_type: connector.connector_type,
            source_id: source_id.to_string(),
            user_id: user_id.to_string(),
            connector_id: connector.id.clone(),
            status,
            updated_at: now,
            received_time: options.received_time,
            processed_time: None,
            completed_time: None,
            completed_count: None,
            messages: Vec::new(),
            errors: Vec::new(),
        };

        let created = self.write_new_work(&work).await;
        metrics::works_created().add(
            1,
            &[
                KeyValue::new("connector_type", connector.connector_type.to_string()),
                KeyValue::new("result", if created.is_ok() { "ok" } else { "error" }),
            ],
        );
        created?;

        info!(
            work_id = %id,
            connector_id = %connector.id,
            source_id,
            %status,
            "work created"
        );

        self.works
            .get(&id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("work {id}")))
    }

    async fn write_new_work(&self, work: &Work) -> Result<()> {
        let id = &work.id;
        self.counters.create(id, 0, 0).await?;

        let Err(insert_err) = self.works.insert(work).await else {
            return Ok(());
        };

        warn!(work_id = %id, error = %insert_err, "work insert failed, removing its counter");
        if let Err(cleanup_err) = self.counters.delete(std::slice::from_ref(id)).await {
            error!(work_id = %id, error = %cleanup_err, "counter cleanup failed");
            return Err(Error::OrphanRisk {
                work_id: id.to_string(),
                source: Box::new(insert_err),
            });
        }
        Err(insert_err)
    }

    /// Heartbeat: bump `updated_at` and nothing else.
    pub async fn ping_work(&self, id: &WorkId) -> Result<Work> {
        let applied = self.apply(id, &WorkPatch::at(Utc::now())).await?;
        metrics::work_reports().add(1, &[KeyValue::new("kind", "ping")]);
        Ok(applied.work)
    }

    /// Delete a work and its counter. Deleting a missing work succeeds.
    pub async fn delete_work(&self, id: &WorkId) -> Result<()> {
        self.delete_one(id, "explicit").await.map(|_| ())
    }

    /// Delete every work operating on `source_id`, one at a time.
    ///
    /// Not transactional: a failure part-way leaves the remaining works.
    pub async fn delete_work_for_source(&self, source_id: &str) -> Result<usize> {
        let filter = WorkFilter {
            source_id: Some(source_id.to_string()),
            ..Default::default()
        };
        let deleted = self.delete_matching(filter, "source").await?;
        info!(source_id, deleted, "works deleted for source");
        Ok(deleted)
    }

    /// Delete every work of a connector, one at a time.
    pub async fn delete_work_for_connector(&self, connector_id: &str) -> Result<usize> {
        let filter = WorkFilter {
            connector_id: Some(connector_id.to_string()),
            ..Default::default()
        };
        let deleted = self.delete_matching(filter, "connector").await?;
        info!(connector_id, deleted, "works deleted for connector");
        Ok(deleted)
    }

    /// Pages run until none match. Records removed by a concurrent deleter
    /// count as progress; a page that comes back unchanged is an error.
    async fn delete_matching(&self, filter: WorkFilter, reason: &'static str) -> Result<usize> {
        let mut deleted = 0;
        let mut previous: Vec<WorkId> = Vec::new();
        loop {
            let query = WorkQuery::new(filter.clone(), self.config.retention_page_size);
            let page = self.works.paginate(&query).await?;
            if page.is_empty() {
                return Ok(deleted);
            }

            let ids: Vec<WorkId> = page.into_iter().map(|w| w.id).collect();
            if ids == previous {
                return Err(Error::Other(format!(
                    "{} work(s) survived deletion, first {}",
                    ids.len(),
                    ids[0]
                )));
            }
            for id in &ids {
                deleted += self.delete_one(id, reason).await?;
            }
            previous = ids;
        }
    }

    async fn delete_one(&self, id: &WorkId, reason: &'static str) -> Result<usize> {
        let ids = std::slice::from_ref(id);
        self.counters.delete(ids).await?;
        let deleted = self.works.delete(ids).await? as usize;
        if deleted > 0 {
            metrics::works_deleted().add(deleted as u64, &[KeyValue::new("reason", reason)]);
        }
        Ok(deleted)
    }
}
