//! Work tracking engine. The public API for creating, reporting on and
//! deleting works.
//!
//! The engine owns no state of its own and takes no locks: every guarantee
//! under concurrent reporters comes from the atomic primitives of the two
//! stores. The engine is the only component that decides completion.

mod export;
mod lifecycle;
mod report;
mod retention;

use std::sync::Arc;

use crate::connector::{ConnectorCatalog, ConnectorRegistry};
use crate::error::{Error, Result};
use crate::ids::{UuidWorkIds, WorkIdSource};
use crate::model::*;
use crate::store::{
    CounterStore, MemoryCounterStore, MemoryWorkStore, PatchResult, WorkFilter, WorkPatch,
    WorkQuery, WorkStore,
};

/// Tunables of the engine.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Age after which completed works of non-enrichment connectors go.
    pub default_retention_days: i64,
    /// Age after which completed works of enrichment connectors go.
    pub enrichment_retention_days: i64,
    /// Records fetched and deleted per retention page.
    pub retention_page_size: usize,
    /// Most recent export works considered by the export projection.
    pub export_progress_limit: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            default_retention_days: 30,
            enrichment_retention_days: 2,
            retention_page_size: 500,
            export_progress_limit: 10,
        }
    }
}

/// The work tracker.
pub struct WorkTracker {
    works: Arc<dyn WorkStore>,
    counters: Arc<dyn CounterStore>,
    connectors: Arc<dyn ConnectorRegistry>,
    ids: Arc<dyn WorkIdSource>,
    config: TrackerConfig,
}

impl WorkTracker {
    pub fn new(
        works: Arc<dyn WorkStore>,
        counters: Arc<dyn CounterStore>,
        connectors: Arc<dyn ConnectorRegistry>,
    ) -> Self {
        Self {
            works,
            counters,
            connectors,
            ids: Arc::new(UuidWorkIds),
            config: TrackerConfig::default(),
        }
    }

    /// A tracker over in-memory stores with an empty connector catalog.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryWorkStore::new()),
            Arc::new(MemoryCounterStore::new()),
            Arc::new(ConnectorCatalog::empty()),
        )
    }

    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_id_source(mut self, ids: Arc<dyn WorkIdSource>) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Get a work by id. `None` if it does not exist.
    pub async fn get_work(&self, id: &WorkId) -> Result<Option<Work>> {
        self.works.get(id).await
    }

    /// A work merged with its live counter figures.
    pub async fn work_progress(&self, id: &WorkId) -> Result<Option<WorkProgress>> {
        let Some(work) = self.works.get(id).await? else {
            return Ok(None);
        };
        let figures = self.counters.get(id).await?;
        Ok(Some(WorkProgress {
            work,
            expected: figures.map(|f| f.expected),
            processed: figures.map(|f| f.processed),
        }))
    }

    /// One page of works.
    pub async fn list_works(&self, query: &WorkQuery) -> Result<Vec<Work>> {
        self.works.paginate(query).await
    }

    /// Most recent works of a connector, newest first.
    pub async fn works_for_connector(&self, connector_id: &str, first: usize) -> Result<Vec<Work>> {
        let filter = WorkFilter {
            connector_id: Some(connector_id.to_string()),
            ..Default::default()
        };
        self.works.paginate(&WorkQuery::new(filter, first)).await
    }

    /// Most recent works operating on a source, newest first.
    pub async fn works_for_source(&self, source_id: &str, first: usize) -> Result<Vec<Work>> {
        let filter = WorkFilter {
            source_id: Some(source_id.to_string()),
            ..Default::default()
        };
        self.works.paginate(&WorkQuery::new(filter, first)).await
    }

    /// Apply a patch, turning a missing record into `NotFound`.
    async fn apply(&self, id: &WorkId, patch: &WorkPatch) -> Result<PatchResult> {
        self.works
            .apply(id, patch)
            .await?
            .ok_or_else(|| Error::NotFound(format!("work {id}")))
    }
}
