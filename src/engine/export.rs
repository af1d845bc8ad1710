//! Export progress projection.

use super::WorkTracker;
use crate::error::Result;
use crate::model::*;
use crate::store::{WorkFilter, WorkQuery};

impl WorkTracker {
    /// In-flight or failed exports of a source, as progress files.
    ///
    /// Looks at the most recent export works only (newest first) and drops
    /// those that completed cleanly. Read-only.
    pub async fn export_progress(&self, source_id: &str) -> Result<Vec<ProgressFile>> {
        let filter = WorkFilter {
            source_id: Some(source_id.to_string()),
            work_type: Some(ConnectorType::InternalExportFile),
            ..Default::default()
        };
        let works = self
            .works
            .paginate(&WorkQuery::new(filter, self.config.export_progress_limit))
            .await?;

        Ok(works
            .iter()
            .filter(|w| !w.is_complete() || !w.errors.is_empty())
            .map(ProgressFile::from)
            .collect())
    }
}
