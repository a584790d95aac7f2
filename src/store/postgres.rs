//! # Postgres Backend
//!
//! Production implementations of the persistence seams over sqlx. Checkpoint
//! saves rely on the `(job_type, scope_id, step)` unique key so every write is
//! an `ON CONFLICT` upsert, and work selection is a single ordered query.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::constants::{JobType, BATCH_PROGRESS_STEP, GLOBAL_SCOPE};
use crate::engine::work_selector::{SelectorConfig, WorkSelector};
use crate::error::{BatchError, Result};
use crate::models::{BatchProgress, Checkpoint, CheckpointData, NewWorkItem, ScopeId, WorkItem};
use crate::state_machine::{self, WorkItemStatus};
use crate::store::{CheckpointStore, WorkItemRepository};

/// Apply the crate's migrations to the given pool.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}

fn parse_field<T: std::str::FromStr<Err = String>>(raw: &str, field: &str) -> Result<T> {
    raw.parse()
        .map_err(|e: String| BatchError::StateTransition(format!("corrupt {field} column: {e}")))
}

fn work_item_from_row(row: &PgRow) -> Result<WorkItem> {
    let job_type: String = row.try_get("job_type")?;
    let priority: String = row.try_get("priority")?;
    let status: String = row.try_get("status")?;
    Ok(WorkItem {
        item_id: row.try_get("item_id")?,
        job_type: parse_field(&job_type, "job_type")?,
        target_id: row.try_get("target_id")?,
        priority: parse_field(&priority, "priority")?,
        payload: row.try_get("payload")?,
        status: parse_field(&status, "status")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        last_processed_at: row.try_get("last_processed_at")?,
    })
}

fn checkpoint_from_row(row: &PgRow) -> Result<Checkpoint> {
    let scope_id: String = row.try_get("scope_id")?;
    let data: serde_json::Value = row.try_get("data")?;
    Ok(Checkpoint {
        scope_id: ScopeId::from_stored(&scope_id),
        step: row.try_get("step")?,
        data: serde_json::from_value(data)?,
        created_at: row.try_get("created_at")?,
    })
}

/// Checkpoint store backed by the `alpharank_checkpoints` table.
#[derive(Clone)]
pub struct PgCheckpointStore {
    pool: PgPool,
}

impl PgCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn save(
        &self,
        job_type: JobType,
        scope: &ScopeId,
        step: &str,
        data: CheckpointData,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alpharank_checkpoints (job_type, scope_id, step, data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (job_type, scope_id, step)
            DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
            "#,
        )
        .bind(job_type.to_string())
        .bind(scope.as_str())
        .bind(step)
        .bind(serde_json::to_value(&data)?)
        .execute(&self.pool)
        .await?;

        debug!(job_type = %job_type, scope = %scope, step = %step, "Checkpoint saved");
        Ok(())
    }

    async fn load(
        &self,
        job_type: JobType,
        scope: &ScopeId,
        step: &str,
    ) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            r#"
            SELECT scope_id, step, data, created_at
            FROM alpharank_checkpoints
            WHERE job_type = $1 AND scope_id = $2 AND step = $3
            "#,
        )
        .bind(job_type.to_string())
        .bind(scope.as_str())
        .bind(step)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(checkpoint_from_row).transpose()
    }

    async fn load_scope(
        &self,
        job_type: JobType,
        scope: &ScopeId,
    ) -> Result<HashMap<String, Checkpoint>> {
        let rows = sqlx::query(
            r#"
            SELECT scope_id, step, data, created_at
            FROM alpharank_checkpoints
            WHERE job_type = $1 AND scope_id = $2
            "#,
        )
        .bind(job_type.to_string())
        .bind(scope.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut checkpoints = HashMap::with_capacity(rows.len());
        for row in &rows {
            let checkpoint = checkpoint_from_row(row)?;
            checkpoints.insert(checkpoint.step.clone(), checkpoint);
        }
        Ok(checkpoints)
    }

    async fn clear(&self, job_type: JobType, scope: &ScopeId) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM alpharank_checkpoints WHERE job_type = $1 AND scope_id = $2",
        )
        .bind(job_type.to_string())
        .bind(scope.as_str())
        .execute(&self.pool)
        .await?;

        debug!(
            job_type = %job_type,
            scope = %scope,
            removed = result.rows_affected(),
            "Checkpoints cleared"
        );
        Ok(result.rows_affected())
    }

    async fn load_progress(&self, job_type: JobType) -> Result<Option<BatchProgress>> {
        let checkpoint = self
            .load(job_type, &ScopeId::Global, BATCH_PROGRESS_STEP)
            .await?;
        match checkpoint {
            Some(Checkpoint {
                data: CheckpointData::Progress(progress),
                ..
            }) => Ok(Some(progress)),
            Some(_) => Err(BatchError::StateTransition(format!(
                "global progress checkpoint for {job_type} holds non-progress data"
            ))),
            None => Ok(None),
        }
    }

    async fn save_progress(&self, job_type: JobType, progress: &BatchProgress) -> Result<()> {
        self.save(
            job_type,
            &ScopeId::Global,
            BATCH_PROGRESS_STEP,
            CheckpointData::Progress(progress.clone()),
        )
        .await
    }

    async fn compact_legacy_null_scopes(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        // Drop legacy NULL-scope rows shadowed by an existing sentinel row,
        // then rewrite the survivors to the sentinel encoding.
        sqlx::query(
            r#"
            DELETE FROM alpharank_checkpoints legacy
            USING alpharank_checkpoints current
            WHERE legacy.scope_id IS NULL
              AND current.scope_id = $1
              AND legacy.job_type = current.job_type
              AND legacy.step = current.step
            "#,
        )
        .bind(GLOBAL_SCOPE)
        .execute(&mut *tx)
        .await?;

        let rewritten = sqlx::query(
            "UPDATE alpharank_checkpoints SET scope_id = $1, updated_at = NOW() WHERE scope_id IS NULL",
        )
        .bind(GLOBAL_SCOPE)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if rewritten.rows_affected() > 0 {
            info!(
                rewritten = rewritten.rows_affected(),
                "Compacted legacy null-scope checkpoints into sentinel scope"
            );
        }
        Ok(rewritten.rows_affected())
    }
}

/// Work item repository backed by the `alpharank_work_items` table.
#[derive(Clone)]
pub struct PgWorkItemRepository {
    pool: PgPool,
}

impl PgWorkItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkItemRepository for PgWorkItemRepository {
    async fn create(&self, new_item: NewWorkItem) -> Result<WorkItem> {
        let item = WorkItem::from_new(new_item, Utc::now());
        sqlx::query(
            r#"
            INSERT INTO alpharank_work_items
              (item_id, job_type, target_id, priority, payload, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(item.item_id)
        .bind(item.job_type.to_string())
        .bind(&item.target_id)
        .bind(item.priority.to_string())
        .bind(&item.payload)
        .bind(item.status.to_string())
        .bind(item.created_at)
        .execute(&self.pool)
        .await?;
        Ok(item)
    }

    async fn find(&self, item_id: Uuid) -> Result<Option<WorkItem>> {
        let row = sqlx::query(
            r#"
            SELECT item_id, job_type, target_id, priority, payload, status,
                   error_message, created_at, last_processed_at
            FROM alpharank_work_items
            WHERE item_id = $1
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(work_item_from_row).transpose()
    }

    async fn update_status(
        &self,
        item_id: Uuid,
        status: WorkItemStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        // Single-writer assumption: read-then-write is safe because only one
        // invocation owns an item at a time.
        let current = self
            .find(item_id)
            .await?
            .ok_or_else(|| BatchError::StateTransition(format!("unknown work item {item_id}")))?;
        let next = state_machine::transition(current.status, status)?;

        sqlx::query(
            "UPDATE alpharank_work_items SET status = $2, error_message = $3 WHERE item_id = $1",
        )
        .bind(item_id)
        .bind(next.to_string())
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn touch(&self, item_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE alpharank_work_items SET last_processed_at = $2 WHERE item_id = $1")
            .bind(item_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset_failed(&self, job_type: JobType) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            UPDATE alpharank_work_items
            SET status = $2, error_message = NULL
            WHERE job_type = $1 AND status = $3
            RETURNING item_id
            "#,
        )
        .bind(job_type.to_string())
        .bind(WorkItemStatus::Pending.to_string())
        .bind(WorkItemStatus::Failed.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<Uuid, _>("item_id").map_err(BatchError::from))
            .collect()
    }
}

/// Work selector backed by a single ordered query.
#[derive(Clone)]
pub struct PgWorkSelector {
    pool: PgPool,
    config: SelectorConfig,
}

impl PgWorkSelector {
    /// Build the policy from the deployment's execution section with
    /// `SelectorConfig::from(&batch_config.execution)`.
    pub fn new(pool: PgPool, config: SelectorConfig) -> Self {
        Self { pool, config }
    }

    fn window_start(&self) -> DateTime<Utc> {
        Utc::now() - self.config.duplicate_window
    }
}

const SELECTION_FILTER: &str = r#"
    w.job_type = $1
    AND w.status IN ('pending', 'processing')
    AND NOT EXISTS (
        SELECT 1 FROM alpharank_work_items other
        WHERE other.job_type = w.job_type
          AND other.target_id = w.target_id
          AND other.item_id <> w.item_id
          AND other.status IN ('pending', 'processing')
          AND other.created_at < w.created_at
          AND other.created_at > $2
    )
"#;

#[async_trait]
impl WorkSelector for PgWorkSelector {
    async fn select(&self, job_type: JobType, limit: usize) -> Result<Vec<WorkItem>> {
        let sql = format!(
            r#"
            SELECT w.item_id, w.job_type, w.target_id, w.priority, w.payload, w.status,
                   w.error_message, w.created_at, w.last_processed_at
            FROM alpharank_work_items w
            WHERE {SELECTION_FILTER}
            ORDER BY CASE w.priority WHEN 'premium' THEN 0 ELSE 1 END,
                     w.last_processed_at ASC NULLS FIRST,
                     w.created_at ASC
            LIMIT $3
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(job_type.to_string())
            .bind(self.window_start())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(work_item_from_row).collect()
    }

    async fn count_outstanding(&self, job_type: JobType) -> Result<u32> {
        let sql = format!(
            "SELECT COUNT(*) AS outstanding FROM alpharank_work_items w WHERE {SELECTION_FILTER}"
        );
        let row = sqlx::query(&sql)
            .bind(job_type.to_string())
            .bind(self.window_start())
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("outstanding")?;
        Ok(count as u32)
    }
}
