//! Integration tests for the work tracker, on in-memory stores.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use worktrack::connector::ConnectorCatalog;
use worktrack::engine::{TrackerConfig, WorkTracker};
use worktrack::error::{Error, Result};
use worktrack::model::*;
use worktrack::store::{
    CounterStore, MemoryCounterStore, MemoryWorkStore, PatchResult, WorkPatch, WorkQuery,
    WorkStore,
};

fn export_connector() -> Connector {
    Connector::new("conn-export", "ExportFileStix", ConnectorType::InternalExportFile)
}

fn import_connector() -> Connector {
    Connector::new("conn-import", "ImportFileStix", ConnectorType::InternalImportFile)
}

fn enrichment_connector() -> Connector {
    Connector::new("conn-enrich", "IpInfo", ConnectorType::InternalEnrichment)
}

struct Fixture {
    tracker: WorkTracker,
    works: Arc<MemoryWorkStore>,
    counters: Arc<MemoryCounterStore>,
}

fn fixture_with(config: TrackerConfig) -> Fixture {
    let works = Arc::new(MemoryWorkStore::new());
    let counters = Arc::new(MemoryCounterStore::new());
    let catalog = Arc::new(ConnectorCatalog::from_connectors([
        export_connector(),
        import_connector(),
        enrichment_connector(),
    ]));
    let tracker =
        WorkTracker::new(works.clone(), counters.clone(), catalog).with_config(config);
    Fixture {
        tracker,
        works,
        counters,
    }
}

fn fixture() -> Fixture {
    fixture_with(TrackerConfig::default())
}

/// A completed work record, as if finished `days_ago` days ago.
fn completed_work(id: &str, connector: &Connector, days_ago: i64) -> Work {
    let completed = Utc::now() - Duration::days(days_ago);
    Work {
        id: WorkId::from(id),
        timestamp: completed - Duration::hours(1),
        name: format!("work {id}"),
        work_type: connector.connector_type,
        source_id: "source-1".to_string(),
        user_id: "user-1".to_string(),
        connector_id: connector.id.clone(),
        status: WorkStatus::Complete,
        updated_at: completed,
        received_time: Some(completed - Duration::minutes(30)),
        processed_time: Some(completed),
        completed_time: Some(completed),
        completed_count: Some(1),
        messages: Vec::new(),
        errors: Vec::new(),
    }
}

async fn seed(f: &Fixture, work: Work) {
    f.counters.create(&work.id, 1, 1).await.unwrap();
    f.works.insert(&work).await.unwrap();
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_work_starts_waiting_with_empty_counter() {
    let f = fixture();
    let work = f
        .tracker
        .create_work(
            "user-1",
            &export_connector(),
            "report.pdf",
            "source-1",
            CreateWorkOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(work.status, WorkStatus::Waiting);
    assert_eq!(work.work_type, ConnectorType::InternalExportFile);
    assert_eq!(work.connector_id, "conn-export");
    assert_eq!(work.source_id, "source-1");
    assert!(work.messages.is_empty());
    assert!(work.errors.is_empty());
    assert!(work.received_time.is_none());

    let progress = f.tracker.work_progress(&work.id).await.unwrap().unwrap();
    assert_eq!(progress.expected, Some(0));
    assert_eq!(progress.processed, Some(0));
}

#[tokio::test]
async fn create_work_with_received_time_is_in_progress() {
    let f = fixture();
    let received = Utc::now() - Duration::seconds(10);
    let work = f
        .tracker
        .create_work(
            "user-1",
            &import_connector(),
            "bundle.json",
            "source-1",
            CreateWorkOptions::default().received_at(received),
        )
        .await
        .unwrap();

    assert_eq!(work.status, WorkStatus::InProgress);
    assert_eq!(work.received_time, Some(received));
}

#[tokio::test]
async fn create_work_ids_are_unique() {
    let f = fixture();
    let mut ids = std::collections::HashSet::new();
    for i in 0..5 {
        let work = f
            .tracker
            .create_work(
                "user-1",
                &import_connector(),
                &format!("file-{i}"),
                "source-1",
                CreateWorkOptions::default(),
            )
            .await
            .unwrap();
        assert!(ids.insert(work.id));
    }
    assert_eq!(f.works.len().await, 5);
    assert_eq!(f.counters.len().await, 5);
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn report_received_moves_to_in_progress_and_logs_message() {
    let f = fixture();
    let work = f
        .tracker
        .create_work("u", &import_connector(), "n", "s", CreateWorkOptions::default())
        .await
        .unwrap();

    let updated = f
        .tracker
        .report_received(&work.id, Some("picked up"))
        .await
        .unwrap();
    assert_eq!(updated.status, WorkStatus::InProgress);
    assert!(updated.received_time.is_some());
    assert_eq!(updated.messages.len(), 1);
    assert_eq!(updated.messages[0].message, "picked up");
    assert!(updated.messages[0].source.is_none());

    // A second report keeps the first received time and adds no empty entry.
    let again = f.tracker.report_received(&work.id, None).await.unwrap();
    assert_eq!(again.received_time, updated.received_time);
    assert_eq!(again.messages.len(), 1);
}

#[tokio::test]
async fn report_action_completes_exactly_when_processed_reaches_expected() {
    let f = fixture();
    let work = f
        .tracker
        .create_work("u", &import_connector(), "n", "s", CreateWorkOptions::default())
        .await
        .unwrap();
    assert_eq!(f.tracker.add_expectations(&work.id, 3).await.unwrap(), 3);

    let first = f.tracker.report_action(&work.id, None).await.unwrap();
    assert!(!first.is_complete);
    assert_eq!(first.total, 1);
    let second = f.tracker.report_action(&work.id, None).await.unwrap();
    assert!(!second.is_complete);
    let third = f.tracker.report_action(&work.id, None).await.unwrap();
    assert!(third.is_complete);
    assert_eq!(third.total, 3);

    let done = f.tracker.get_work(&work.id).await.unwrap().unwrap();
    assert_eq!(done.status, WorkStatus::Complete);
    assert_eq!(done.completed_count, Some(3));
    assert!(done.completed_time.is_some());
}

#[tokio::test]
async fn report_action_with_error_appends_without_completing() {
    let f = fixture();
    let work = f
        .tracker
        .create_work("u", &import_connector(), "n", "s", CreateWorkOptions::default())
        .await
        .unwrap();
    f.tracker.report_received(&work.id, None).await.unwrap();
    f.tracker.add_expectations(&work.id, 2).await.unwrap();

    let tick = f
        .tracker
        .report_action(&work.id, Some(ErrorData::new("boom", "worker-2")))
        .await
        .unwrap();
    assert!(!tick.is_complete);

    let updated = f.tracker.get_work(&work.id).await.unwrap().unwrap();
    assert_eq!(updated.status, WorkStatus::InProgress);
    assert_eq!(updated.errors.len(), 1);
    assert_eq!(updated.errors[0].message, "boom");
    assert_eq!(updated.errors[0].source.as_deref(), Some("worker-2"));
}

#[tokio::test]
async fn report_action_without_completion_leaves_record_untouched() {
    let f = fixture();
    let work = f
        .tracker
        .create_work("u", &import_connector(), "n", "s", CreateWorkOptions::default())
        .await
        .unwrap();
    f.tracker.add_expectations(&work.id, 5).await.unwrap();

    f.tracker.report_action(&work.id, None).await.unwrap();
    let after = f.tracker.get_work(&work.id).await.unwrap().unwrap();
    assert_eq!(after.updated_at, work.updated_at);
    assert_eq!(after.status, WorkStatus::Waiting);
}

#[tokio::test]
async fn concurrent_actions_finalize_once() {
    let f = fixture();
    let tracker = Arc::new(f.tracker);
    let work = tracker
        .create_work("u", &import_connector(), "n", "s", CreateWorkOptions::default())
        .await
        .unwrap();
    tracker.add_expectations(&work.id, 20).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let tracker = tracker.clone();
        let id = work.id.clone();
        handles.push(tokio::spawn(async move {
            tracker.report_action(&id, None).await.unwrap()
        }));
    }

    let mut completions = 0;
    for handle in handles {
        if handle.await.unwrap().is_complete {
            completions += 1;
        }
    }
    assert_eq!(completions, 1);

    let done = tracker.get_work(&work.id).await.unwrap().unwrap();
    assert_eq!(done.status, WorkStatus::Complete);
    assert_eq!(done.completed_count, Some(20));
}

#[tokio::test]
async fn report_processed_completes_when_counters_match() {
    let f = fixture();
    let work = f
        .tracker
        .create_work("u", &import_connector(), "n", "s", CreateWorkOptions::default())
        .await
        .unwrap();
    f.tracker.add_expectations(&work.id, 2).await.unwrap();
    f.tracker.report_action(&work.id, None).await.unwrap();

    let pending = f
        .tracker
        .report_processed(&work.id, Some("half way"), false)
        .await
        .unwrap();
    assert_ne!(pending.status, WorkStatus::Complete);
    let processed_time = pending.processed_time;
    assert!(processed_time.is_some());
    assert_eq!(pending.messages.len(), 1);

    f.tracker.report_action(&work.id, None).await.unwrap();
    let done = f
        .tracker
        .report_processed(&work.id, Some("parse failure"), true)
        .await
        .unwrap();
    assert_eq!(done.status, WorkStatus::Complete);
    assert_eq!(done.completed_count, Some(2));
    assert_eq!(done.processed_time, processed_time);
    assert_eq!(done.errors.len(), 1);
    assert_eq!(done.errors[0].message, "parse failure");
}

#[tokio::test]
async fn repeated_processed_reports_keep_first_completion() {
    let f = fixture();
    let work = f
        .tracker
        .create_work("u", &import_connector(), "n", "s", CreateWorkOptions::default())
        .await
        .unwrap();

    // 0 expected, 0 processed: complete on the first report.
    let first = f.tracker.report_processed(&work.id, None, false).await.unwrap();
    assert_eq!(first.status, WorkStatus::Complete);
    assert_eq!(first.completed_count, Some(0));

    let second = f.tracker.report_processed(&work.id, None, false).await.unwrap();
    assert_eq!(second.completed_time, first.completed_time);
    assert_eq!(second.completed_count, Some(0));
}

#[tokio::test]
async fn ping_only_touches_updated_at() {
    let f = fixture();
    let work = f
        .tracker
        .create_work("u", &import_connector(), "n", "s", CreateWorkOptions::default())
        .await
        .unwrap();

    let pinged = f.tracker.ping_work(&work.id).await.unwrap();
    assert!(pinged.updated_at >= work.updated_at);
    assert_eq!(pinged.status, work.status);
    assert!(pinged.messages.is_empty());
}

// ---------------------------------------------------------------------------
// Missing works
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reports_on_missing_work_are_not_found() {
    let f = fixture();
    let missing = WorkId::from("nope");

    assert!(matches!(
        f.tracker.report_received(&missing, None).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        f.tracker.report_processed(&missing, None, false).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        f.tracker.report_action(&missing, None).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        f.tracker.add_expectations(&missing, 1).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        f.tracker.ping_work(&missing).await,
        Err(Error::NotFound(_))
    ));
    assert!(f.tracker.get_work(&missing).await.unwrap().is_none());
    assert!(f.tracker.work_progress(&missing).await.unwrap().is_none());
}

#[tokio::test]
async fn deleting_missing_work_is_a_no_op() {
    let f = fixture();
    f.tracker.delete_work(&WorkId::from("nope")).await.unwrap();
}

// ---------------------------------------------------------------------------
// Deletion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_work_removes_record_and_counter() {
    let f = fixture();
    let work = f
        .tracker
        .create_work("u", &import_connector(), "n", "s", CreateWorkOptions::default())
        .await
        .unwrap();

    f.tracker.delete_work(&work.id).await.unwrap();
    assert!(f.tracker.get_work(&work.id).await.unwrap().is_none());
    assert!(f.counters.is_empty().await);
}

#[tokio::test]
async fn delete_work_for_source_only_touches_that_source() {
    let f = fixture_with(TrackerConfig {
        retention_page_size: 2,
        ..TrackerConfig::default()
    });
    for i in 0..5 {
        f.tracker
            .create_work(
                "u",
                &import_connector(),
                &format!("n{i}"),
                "doomed",
                CreateWorkOptions::default(),
            )
            .await
            .unwrap();
    }
    let kept = f
        .tracker
        .create_work("u", &import_connector(), "k", "kept", CreateWorkOptions::default())
        .await
        .unwrap();

    let deleted = f.tracker.delete_work_for_source("doomed").await.unwrap();
    assert_eq!(deleted, 5);
    assert_eq!(f.works.len().await, 1);
    assert_eq!(f.counters.len().await, 1);
    assert!(f.tracker.get_work(&kept.id).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_work_for_connector_removes_all_its_works() {
    let f = fixture();
    for _ in 0..3 {
        f.tracker
            .create_work("u", &export_connector(), "n", "s", CreateWorkOptions::default())
            .await
            .unwrap();
    }
    f.tracker
        .create_work("u", &import_connector(), "n", "s", CreateWorkOptions::default())
        .await
        .unwrap();

    let deleted = f
        .tracker
        .delete_work_for_connector("conn-export")
        .await
        .unwrap();
    assert_eq!(deleted, 3);
    assert!(
        f.tracker
            .works_for_connector("conn-export", 10)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(f.tracker.works_for_source("s", 10).await.unwrap().len(), 1);
}

/// Record store where another deleter removes the first `stolen` records
/// just before this tracker's own delete reaches them.
struct ContendedWorks {
    inner: MemoryWorkStore,
    stolen: AtomicUsize,
}

#[async_trait]
impl WorkStore for ContendedWorks {
    async fn insert(&self, work: &Work) -> Result<()> {
        self.inner.insert(work).await
    }
    async fn get(&self, id: &WorkId) -> Result<Option<Work>> {
        self.inner.get(id).await
    }
    async fn paginate(&self, query: &WorkQuery) -> Result<Vec<Work>> {
        self.inner.paginate(query).await
    }
    async fn apply(&self, id: &WorkId, patch: &WorkPatch) -> Result<Option<PatchResult>> {
        self.inner.apply(id, patch).await
    }
    async fn delete(&self, ids: &[WorkId]) -> Result<u64> {
        let removed = self.inner.delete(ids).await?;
        let steal = self
            .stolen
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        Ok(if steal { 0 } else { removed })
    }
}

#[tokio::test]
async fn source_cascade_continues_past_a_page_taken_by_another_deleter() {
    let works = Arc::new(ContendedWorks {
        inner: MemoryWorkStore::new(),
        stolen: AtomicUsize::new(2),
    });
    let counters = Arc::new(MemoryCounterStore::new());
    let tracker = WorkTracker::new(
        works.clone(),
        counters.clone(),
        Arc::new(ConnectorCatalog::empty()),
    )
    .with_config(TrackerConfig {
        retention_page_size: 2,
        ..TrackerConfig::default()
    });

    for i in 0..5 {
        tracker
            .create_work(
                "u",
                &import_connector(),
                &format!("n{i}"),
                "doomed",
                CreateWorkOptions::default(),
            )
            .await
            .unwrap();
    }

    let deleted = tracker.delete_work_for_source("doomed").await.unwrap();
    assert_eq!(deleted, 3);
    assert!(works.inner.is_empty().await);
    assert!(counters.is_empty().await);
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enrichment_works_expire_after_two_days() {
    let f = fixture();
    let connector = enrichment_connector();
    seed(&f, completed_work("old", &connector, 3)).await;
    seed(&f, completed_work("fresh", &connector, 1)).await;

    let deleted = f
        .tracker
        .delete_old_completed_works(&connector)
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(f.tracker.get_work(&WorkId::from("old")).await.unwrap().is_none());
    assert!(f.tracker.get_work(&WorkId::from("fresh")).await.unwrap().is_some());
    assert_eq!(f.counters.len().await, 1);
}

#[tokio::test]
async fn other_works_expire_after_thirty_days() {
    let f = fixture();
    let connector = import_connector();
    seed(&f, completed_work("old", &connector, 31)).await;
    seed(&f, completed_work("recent", &connector, 3)).await;

    let deleted = f
        .tracker
        .delete_old_completed_works(&connector)
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(f.tracker.get_work(&WorkId::from("recent")).await.unwrap().is_some());
}

#[tokio::test]
async fn retention_never_deletes_unfinished_works() {
    let f = fixture();
    let connector = enrichment_connector();
    let mut stuck = completed_work("stuck", &connector, 10);
    stuck.status = WorkStatus::InProgress;
    stuck.completed_time = None;
    stuck.completed_count = None;
    stuck.timestamp = Utc::now() - Duration::days(60);
    seed(&f, stuck).await;

    let deleted = f
        .tracker
        .delete_old_completed_works(&connector)
        .await
        .unwrap();
    assert_eq!(deleted, 0);
    assert!(f.tracker.get_work(&WorkId::from("stuck")).await.unwrap().is_some());
}

#[tokio::test]
async fn retention_walks_every_page() {
    let f = fixture_with(TrackerConfig {
        retention_page_size: 2,
        ..TrackerConfig::default()
    });
    let connector = enrichment_connector();
    for i in 0..7 {
        seed(&f, completed_work(&format!("old-{i}"), &connector, 3 + i)).await;
    }
    seed(&f, completed_work("fresh", &connector, 0)).await;

    let deleted = f
        .tracker
        .delete_old_completed_works(&connector)
        .await
        .unwrap();
    assert_eq!(deleted, 7);
    assert_eq!(f.works.len().await, 1);
    assert_eq!(f.counters.len().await, 1);
}

#[tokio::test]
async fn retention_is_scoped_to_the_connector() {
    let f = fixture();
    let enrich = enrichment_connector();
    let other = Connector::new("conn-enrich-2", "Shodan", ConnectorType::InternalEnrichment);
    seed(&f, completed_work("mine", &enrich, 5)).await;
    seed(&f, completed_work("theirs", &other, 5)).await;

    assert_eq!(f.tracker.delete_old_completed_works(&enrich).await.unwrap(), 1);
    assert!(f.tracker.get_work(&WorkId::from("theirs")).await.unwrap().is_some());
}

#[tokio::test]
async fn expired_works_with_errors_are_still_deleted() {
    let f = fixture();
    let connector = enrichment_connector();
    let mut failed = completed_work("failed", &connector, 3);
    failed
        .errors
        .push(LogEntry::new(Utc::now(), "lookup failed").with_source("worker-1"));
    seed(&f, failed).await;

    let deleted = f
        .tracker
        .delete_old_completed_works(&connector)
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(f.works.is_empty().await);
    assert!(f.counters.is_empty().await);
}

#[tokio::test]
async fn works_completed_at_the_horizon_are_deleted() {
    let f = fixture_with(TrackerConfig {
        default_retention_days: 1,
        ..TrackerConfig::default()
    });
    let connector = import_connector();
    let horizon = Utc::now() - Duration::days(1);

    let mut at_horizon = completed_work("at-horizon", &connector, 0);
    at_horizon.completed_time = Some(horizon);
    seed(&f, at_horizon).await;

    let mut inside = completed_work("inside", &connector, 0);
    inside.completed_time = Some(horizon + Duration::minutes(1));
    seed(&f, inside).await;

    let deleted = f
        .tracker
        .delete_old_completed_works(&connector)
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(f.tracker.get_work(&WorkId::from("at-horizon")).await.unwrap().is_none());
    assert!(f.tracker.get_work(&WorkId::from("inside")).await.unwrap().is_some());
}

#[tokio::test]
async fn out_of_range_retention_is_a_config_error() {
    let f = fixture_with(TrackerConfig {
        enrichment_retention_days: 200_000_000,
        default_retention_days: i64::MAX,
        ..TrackerConfig::default()
    });

    assert!(matches!(
        f.tracker
            .delete_old_completed_works(&enrichment_connector())
            .await,
        Err(Error::Config(_))
    ));
    assert!(matches!(
        f.tracker
            .create_work("u", &import_connector(), "n", "s", CreateWorkOptions::default())
            .await,
        Err(Error::Config(_))
    ));
    assert!(f.works.is_empty().await);
    assert!(f.counters.is_empty().await);
}

#[tokio::test]
async fn create_work_runs_retention_first() {
    let f = fixture();
    let connector = enrichment_connector();
    seed(&f, completed_work("expired", &connector, 5)).await;

    f.tracker
        .create_work("u", &connector, "n", "s", CreateWorkOptions::default())
        .await
        .unwrap();
    assert!(f.tracker.get_work(&WorkId::from("expired")).await.unwrap().is_none());
    assert_eq!(f.works.len().await, 1);
}

#[tokio::test]
async fn purge_expired_resolves_connector_through_registry() {
    let f = fixture();
    seed(&f, completed_work("old", &enrichment_connector(), 5)).await;

    assert_eq!(f.tracker.purge_expired("conn-enrich").await.unwrap(), 1);
    assert!(matches!(
        f.tracker.purge_expired("conn-unknown").await,
        Err(Error::NotFound(_))
    ));
}

// ---------------------------------------------------------------------------
// Export progress
// ---------------------------------------------------------------------------

async fn create_export(tracker: &WorkTracker, name: &str) -> Work {
    tracker
        .create_work("u", &export_connector(), name, "source-x", CreateWorkOptions::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn export_progress_hides_clean_completions() {
    let f = fixture();
    let clean = create_export(&f.tracker, "clean.pdf").await;
    f.tracker.report_processed(&clean.id, None, false).await.unwrap();

    let failed = create_export(&f.tracker, "failed.pdf").await;
    f.tracker.add_expectations(&failed.id, 1).await.unwrap();
    f.tracker
        .report_action(&failed.id, Some(ErrorData::new("render failed", "worker-1")))
        .await
        .unwrap();
    f.tracker.report_processed(&failed.id, None, false).await.unwrap();

    let running = create_export(&f.tracker, "running.pdf").await;

    // Not an export: never shown.
    f.tracker
        .create_work("u", &import_connector(), "in.json", "source-x", CreateWorkOptions::default())
        .await
        .unwrap();

    let files = f.tracker.export_progress("source-x").await.unwrap();
    let mut ids: Vec<_> = files.iter().map(|file| file.id.clone()).collect();
    ids.sort();
    let mut want = vec![failed.id.to_string(), running.id.to_string()];
    want.sort();
    assert_eq!(ids, want);

    let failed_file = files
        .iter()
        .find(|file| file.id == failed.id.as_str())
        .unwrap();
    assert_eq!(failed_file.name, "failed.pdf");
    assert_eq!(failed_file.size, 0);
    assert_eq!(failed_file.upload_status, WorkStatus::Complete);
    assert_eq!(failed_file.meta_data.errors.len(), 1);
}

#[tokio::test]
async fn export_progress_only_considers_latest_exports() {
    let f = fixture_with(TrackerConfig {
        export_progress_limit: 3,
        ..TrackerConfig::default()
    });
    for i in 0..5 {
        f.tracker
            .create_work(
                "u",
                &export_connector(),
                &format!("e{i}"),
                "source-y",
                CreateWorkOptions::default(),
            )
            .await
            .unwrap();
    }

    let files = f.tracker.export_progress("source-y").await.unwrap();
    assert_eq!(files.len(), 3);
    assert!(files.iter().all(|file| file.upload_status == WorkStatus::Waiting));
}

#[tokio::test]
async fn export_progress_serializes_camel_case() {
    let f = fixture();
    f.tracker
        .create_work("u", &export_connector(), "out.csv", "s", CreateWorkOptions::default())
        .await
        .unwrap();

    let files = f.tracker.export_progress("s").await.unwrap();
    let json = serde_json::to_value(&files[0]).unwrap();
    assert!(json.get("lastModified").is_some());
    assert_eq!(json["uploadStatus"], "waiting");
    assert!(json["metaData"]["messages"].as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Creation saga
// ---------------------------------------------------------------------------

/// Record store whose inserts always fail.
struct RejectingWorks(MemoryWorkStore);

#[async_trait]
impl WorkStore for RejectingWorks {
    async fn insert(&self, _work: &Work) -> Result<()> {
        Err(Error::Other("insert rejected".to_string()))
    }
    async fn get(&self, id: &WorkId) -> Result<Option<Work>> {
        self.0.get(id).await
    }
    async fn paginate(&self, query: &WorkQuery) -> Result<Vec<Work>> {
        self.0.paginate(query).await
    }
    async fn apply(&self, id: &WorkId, patch: &WorkPatch) -> Result<Option<PatchResult>> {
        self.0.apply(id, patch).await
    }
    async fn delete(&self, ids: &[WorkId]) -> Result<u64> {
        self.0.delete(ids).await
    }
}

/// Counter store that cannot delete.
struct StickyCounters(Arc<MemoryCounterStore>);

#[async_trait]
impl CounterStore for StickyCounters {
    async fn create(&self, id: &WorkId, expected: i64, processed: i64) -> Result<()> {
        self.0.create(id, expected, processed).await
    }
    async fn increment_and_compare(&self, id: &WorkId) -> Result<Option<CounterTick>> {
        self.0.increment_and_compare(id).await
    }
    async fn get(&self, id: &WorkId) -> Result<Option<CounterFigures>> {
        self.0.get(id).await
    }
    async fn add_expected(&self, id: &WorkId, n: u32) -> Result<Option<i64>> {
        self.0.add_expected(id, n).await
    }
    async fn delete(&self, _ids: &[WorkId]) -> Result<()> {
        Err(Error::Other("counter store unavailable".to_string()))
    }
}

#[tokio::test]
async fn failed_insert_removes_the_counter() {
    let counters = Arc::new(MemoryCounterStore::new());
    let tracker = WorkTracker::new(
        Arc::new(RejectingWorks(MemoryWorkStore::new())),
        counters.clone(),
        Arc::new(ConnectorCatalog::empty()),
    );

    let result = tracker
        .create_work("u", &import_connector(), "n", "s", CreateWorkOptions::default())
        .await;
    assert!(matches!(result, Err(Error::Other(_))));
    assert!(counters.is_empty().await);
}

#[tokio::test]
async fn failed_compensation_reports_orphan_risk() {
    let counters = Arc::new(MemoryCounterStore::new());
    let tracker = WorkTracker::new(
        Arc::new(RejectingWorks(MemoryWorkStore::new())),
        Arc::new(StickyCounters(counters.clone())),
        Arc::new(ConnectorCatalog::empty()),
    );

    let result = tracker
        .create_work("u", &import_connector(), "n", "s", CreateWorkOptions::default())
        .await;
    match result {
        Err(Error::OrphanRisk { work_id, source }) => {
            assert!(matches!(*source, Error::Other(_)));
            assert!(counters.get(&WorkId(work_id)).await.unwrap().is_some());
        }
        other => panic!("expected OrphanRisk, got {other:?}"),
    }
}
