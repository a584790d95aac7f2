//! # In-Memory Backend
//!
//! A single struct implementing all three persistence seams over shared maps.
//! Backs the engine's integration tests and lets lightweight embeddings run
//! the engine without Postgres. Same ordering and exclusion semantics as the
//! Postgres backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::constants::JobType;
use crate::engine::clock::{Clock, SystemClock};
use crate::engine::work_selector::{SelectorConfig, WorkSelector};
use crate::error::{BatchError, Result};
use crate::models::{BatchProgress, Checkpoint, CheckpointData, NewWorkItem, ScopeId, WorkItem};
use crate::state_machine::{self, WorkItemStatus};
use crate::store::{CheckpointStore, WorkItemRepository};

type CheckpointKey = (JobType, String, String);

/// In-memory checkpoint store, work item repository, and work selector.
pub struct MemoryBackend {
    checkpoints: Mutex<HashMap<CheckpointKey, Checkpoint>>,
    items: Mutex<HashMap<Uuid, WorkItem>>,
    selector_config: SelectorConfig,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            checkpoints: Mutex::new(HashMap::new()),
            items: Mutex::new(HashMap::new()),
            selector_config: SelectorConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selector_config(selector_config: SelectorConfig) -> Self {
        Self {
            selector_config,
            ..Self::default()
        }
    }

    /// Replace the wall-clock source, so time-sensitive selection (the
    /// duplicate exclusion window) is deterministic under test.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Test/embedding helper: insert a fully-formed item as-is.
    pub fn insert_item(&self, item: WorkItem) {
        self.items.lock().insert(item.item_id, item);
    }

    /// Test/embedding helper: snapshot one item.
    pub fn get_item(&self, item_id: Uuid) -> Option<WorkItem> {
        self.items.lock().get(&item_id).cloned()
    }

    /// Number of checkpoints currently stored (all scopes).
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.lock().len()
    }

    fn key(job_type: JobType, scope: &ScopeId, step: &str) -> CheckpointKey {
        (job_type, scope.as_str().to_string(), step.to_string())
    }

    fn candidates(&self, job_type: JobType) -> Vec<WorkItem> {
        let items = self.items.lock();
        let now = self.clock.utc_now();
        let window = self.selector_config.duplicate_window;

        let mut selected: Vec<WorkItem> = items
            .values()
            .filter(|item| item.job_type == job_type && item.status.needs_processing())
            .filter(|item| {
                // Exclude when an earlier non-terminal item for the same
                // target exists within the recency window.
                !items.values().any(|other| {
                    other.item_id != item.item_id
                        && other.job_type == job_type
                        && other.target_id == item.target_id
                        && other.status.needs_processing()
                        && other.created_at < item.created_at
                        && now - other.created_at < window
                })
            })
            .cloned()
            .collect();

        selected.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then_with(|| match (a.last_processed_at, b.last_processed_at) {
                    (None, None) => std::cmp::Ordering::Equal,
                    (None, Some(_)) => std::cmp::Ordering::Less,
                    (Some(_), None) => std::cmp::Ordering::Greater,
                    (Some(x), Some(y)) => x.cmp(&y),
                })
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        selected
    }
}

#[async_trait]
impl CheckpointStore for MemoryBackend {
    async fn save(
        &self,
        job_type: JobType,
        scope: &ScopeId,
        step: &str,
        data: CheckpointData,
    ) -> Result<()> {
        let mut checkpoints = self.checkpoints.lock();
        let key = Self::key(job_type, scope, step);
        let created_at = checkpoints
            .get(&key)
            .map(|existing| existing.created_at)
            .unwrap_or_else(|| self.clock.utc_now());
        checkpoints.insert(
            key,
            Checkpoint {
                scope_id: scope.clone(),
                step: step.to_string(),
                data,
                created_at,
            },
        );
        Ok(())
    }

    async fn load(
        &self,
        job_type: JobType,
        scope: &ScopeId,
        step: &str,
    ) -> Result<Option<Checkpoint>> {
        Ok(self
            .checkpoints
            .lock()
            .get(&Self::key(job_type, scope, step))
            .cloned())
    }

    async fn load_scope(
        &self,
        job_type: JobType,
        scope: &ScopeId,
    ) -> Result<HashMap<String, Checkpoint>> {
        let checkpoints = self.checkpoints.lock();
        Ok(checkpoints
            .iter()
            .filter(|((jt, sc, _), _)| *jt == job_type && sc == scope.as_str())
            .map(|((_, _, step), checkpoint)| (step.clone(), checkpoint.clone()))
            .collect())
    }

    async fn clear(&self, job_type: JobType, scope: &ScopeId) -> Result<u64> {
        let mut checkpoints = self.checkpoints.lock();
        let before = checkpoints.len();
        checkpoints.retain(|(jt, sc, _), _| !(*jt == job_type && sc == scope.as_str()));
        Ok((before - checkpoints.len()) as u64)
    }

    async fn load_progress(&self, job_type: JobType) -> Result<Option<BatchProgress>> {
        let loaded = self
            .load(job_type, &ScopeId::Global, crate::constants::BATCH_PROGRESS_STEP)
            .await?;
        match loaded {
            Some(checkpoint) => match checkpoint.data {
                CheckpointData::Progress(progress) => Ok(Some(progress)),
                _ => Err(BatchError::StateTransition(format!(
                    "global progress checkpoint for {job_type} holds non-progress data"
                ))),
            },
            None => Ok(None),
        }
    }

    async fn save_progress(&self, job_type: JobType, progress: &BatchProgress) -> Result<()> {
        self.save(
            job_type,
            &ScopeId::Global,
            crate::constants::BATCH_PROGRESS_STEP,
            CheckpointData::Progress(progress.clone()),
        )
        .await
    }

    async fn compact_legacy_null_scopes(&self) -> Result<u64> {
        // The in-memory representation never had the NULL-scope encoding.
        Ok(0)
    }
}

#[async_trait]
impl WorkItemRepository for MemoryBackend {
    async fn create(&self, new_item: NewWorkItem) -> Result<WorkItem> {
        let item = WorkItem::from_new(new_item, self.clock.utc_now());
        self.items.lock().insert(item.item_id, item.clone());
        Ok(item)
    }

    async fn find(&self, item_id: Uuid) -> Result<Option<WorkItem>> {
        Ok(self.items.lock().get(&item_id).cloned())
    }

    async fn update_status(
        &self,
        item_id: Uuid,
        status: WorkItemStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut items = self.items.lock();
        let item = items
            .get_mut(&item_id)
            .ok_or_else(|| BatchError::StateTransition(format!("unknown work item {item_id}")))?;
        item.status = state_machine::transition(item.status, status)?;
        item.error_message = error_message.map(|message| message.to_string());
        Ok(())
    }

    async fn touch(&self, item_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(item) = self.items.lock().get_mut(&item_id) {
            item.last_processed_at = Some(at);
        }
        Ok(())
    }

    async fn reset_failed(&self, job_type: JobType) -> Result<Vec<Uuid>> {
        let mut items = self.items.lock();
        let mut reset = Vec::new();
        for item in items.values_mut() {
            if item.job_type == job_type && item.status == WorkItemStatus::Failed {
                item.status = WorkItemStatus::Pending;
                item.error_message = None;
                reset.push(item.item_id);
            }
        }
        Ok(reset)
    }
}

#[async_trait]
impl WorkSelector for MemoryBackend {
    async fn select(&self, job_type: JobType, limit: usize) -> Result<Vec<WorkItem>> {
        let mut candidates = self.candidates(job_type);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn count_outstanding(&self, job_type: JobType) -> Result<u32> {
        Ok(self.candidates(job_type).len() as u32)
    }
}
