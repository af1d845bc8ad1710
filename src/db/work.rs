//! Postgres work store: one row per work, logs as jsonb arrays.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

use crate::error::Result;
use crate::model::*;
use crate::store::{OrderMode, PatchResult, WorkOrderField, WorkPatch, WorkQuery, WorkStore};

const WORK_COLUMNS: &str = "id, name, work_type, source_id, user_id, connector_id, status, \
     created_at, updated_at, received_time, processed_time, completed_time, completed_count, \
     messages, errors";

/// The whole patch in one statement. The locking sub-select yields the
/// status before the write so the caller can tell who finalized the work.
const APPLY_PATCH: &str = "UPDATE works AS w SET
        status = CASE
            WHEN prev.status = 'complete' THEN prev.status
            WHEN $2::boolean THEN 'complete'
            WHEN $3::timestamptz IS NOT NULL AND prev.status = 'waiting' THEN 'in_progress'
            ELSE prev.status
        END,
        received_time = COALESCE(w.received_time, $3::timestamptz),
        processed_time = COALESCE(w.processed_time, $4::timestamptz),
        completed_count = CASE WHEN $2::boolean AND prev.status <> 'complete'
            THEN $5::bigint ELSE w.completed_count END,
        completed_time = CASE WHEN $2::boolean AND prev.status <> 'complete'
            THEN $6::timestamptz ELSE w.completed_time END,
        messages = CASE WHEN $7::jsonb IS NULL THEN w.messages
            ELSE w.messages || jsonb_build_array($7::jsonb) END,
        errors = CASE WHEN $8::jsonb IS NULL THEN w.errors
            ELSE w.errors || jsonb_build_array($8::jsonb) END,
        updated_at = $9
     FROM (SELECT id, status FROM works WHERE id = $1 FOR UPDATE) AS prev
     WHERE w.id = prev.id
     RETURNING w.id, w.name, w.work_type, w.source_id, w.user_id, w.connector_id, w.status,
        w.created_at, w.updated_at, w.received_time, w.processed_time, w.completed_time,
        w.completed_count, w.messages, w.errors, prev.status AS previous_status";

#[async_trait]
impl WorkStore for super::Db {
    async fn insert(&self, work: &Work) -> Result<()> {
        sqlx::query(
            "INSERT INTO works (id, name, work_type, source_id, user_id, connector_id, status, created_at, updated_at, received_time, processed_time, completed_time, completed_count, messages, errors)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(work.id.as_str())
        .bind(&work.name)
        .bind(work.work_type.to_string())
        .bind(&work.source_id)
        .bind(&work.user_id)
        .bind(&work.connector_id)
        .bind(work.status.to_string())
        .bind(work.timestamp)
        .bind(work.updated_at)
        .bind(work.received_time)
        .bind(work.processed_time)
        .bind(work.completed_time)
        .bind(work.completed_count)
        .bind(Json(&work.messages))
        .bind(Json(&work.errors))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get(&self, id: &WorkId) -> Result<Option<Work>> {
        let row: Option<WorkRow> =
            sqlx::query_as(&format!("SELECT {WORK_COLUMNS} FROM works WHERE id = $1"))
                .bind(id.as_str())
                .fetch_optional(self.pool())
                .await?;

        row.map(WorkRow::try_into_work).transpose()
    }

    async fn paginate(&self, query: &WorkQuery) -> Result<Vec<Work>> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {WORK_COLUMNS} FROM works WHERE TRUE"));

        let filter = &query.filter;
        if let Some(ref connector_id) = filter.connector_id {
            qb.push(" AND connector_id = ").push_bind(connector_id.clone());
        }
        if let Some(ref source_id) = filter.source_id {
            qb.push(" AND source_id = ").push_bind(source_id.clone());
        }
        if let Some(work_type) = filter.work_type {
            qb.push(" AND work_type = ").push_bind(work_type.to_string());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.to_string());
        }
        if let Some(horizon) = filter.completed_before {
            qb.push(" AND completed_time <= ").push_bind(horizon);
        }

        let column = match query.order_by {
            WorkOrderField::Timestamp => "created_at",
            WorkOrderField::CompletedTime => {
                qb.push(" AND completed_time IS NOT NULL");
                "completed_time"
            }
        };
        let (cmp, dir) = match query.order {
            OrderMode::Asc => (">", "ASC"),
            OrderMode::Desc => ("<", "DESC"),
        };

        if let Some(ref cursor) = query.after {
            qb.push(format!(" AND ({column}, id) {cmp} ("))
                .push_bind(cursor.sort)
                .push(", ")
                .push_bind(cursor.id.0.clone())
                .push(")");
        }

        qb.push(format!(" ORDER BY {column} {dir}, id {dir} LIMIT "))
            .push_bind(i64::try_from(query.first).unwrap_or(i64::MAX));

        let rows: Vec<WorkRow> = qb.build_query_as().fetch_all(self.pool()).await?;
        rows.into_iter().map(WorkRow::try_into_work).collect()
    }

    async fn apply(&self, id: &WorkId, patch: &WorkPatch) -> Result<Option<PatchResult>> {
        let row: Option<PatchedRow> = sqlx::query_as(APPLY_PATCH)
            .bind(id.as_str())
            .bind(patch.completion.is_some())
            .bind(patch.received)
            .bind(patch.processed_at)
            .bind(patch.completion.map(|c| c.count))
            .bind(patch.completion.map(|c| c.at))
            .bind(patch.message.as_ref().map(Json))
            .bind(patch.error.as_ref().map(Json))
            .bind(patch.touched_at)
            .fetch_optional(self.pool())
            .await?;

        row.map(|row| -> Result<PatchResult> {
            Ok(PatchResult {
                previous_status: row.previous_status.parse()?,
                work: row.work.try_into_work()?,
            })
        })
        .transpose()
    }

    async fn delete(&self, ids: &[WorkId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();
        let deleted = sqlx::query("DELETE FROM works WHERE id = ANY($1)")
            .bind(ids)
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(deleted)
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct WorkRow {
    id: String,
    name: String,
    work_type: String,
    source_id: String,
    user_id: String,
    connector_id: String,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    received_time: Option<chrono::DateTime<chrono::Utc>>,
    processed_time: Option<chrono::DateTime<chrono::Utc>>,
    completed_time: Option<chrono::DateTime<chrono::Utc>>,
    completed_count: Option<i64>,
    messages: Json<Vec<LogEntry>>,
    errors: Json<Vec<LogEntry>>,
}

#[derive(sqlx::FromRow)]
struct PatchedRow {
    #[sqlx(flatten)]
    work: WorkRow,
    previous_status: String,
}

impl WorkRow {
    fn try_into_work(self) -> Result<Work> {
        Ok(Work {
            id: WorkId(self.id),
            timestamp: self.created_at,
            name: self.name,
            work_type: self.work_type.parse()?,
            source_id: self.source_id,
            user_id: self.user_id,
            connector_id: self.connector_id,
            status: self.status.parse()?,
            updated_at: self.updated_at,
            received_time: self.received_time,
            processed_time: self.processed_time,
            completed_time: self.completed_time,
            completed_count: self.completed_count,
            messages: self.messages.0,
            errors: self.errors.0,
        })
    }
}
