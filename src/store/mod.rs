//! # Durable Persistence Layer
//!
//! Trait seams for the two pieces of shared mutable state the engine owns:
//! the checkpoint store and the work item queue. Production runs against
//! Postgres ([`postgres`]); the in-memory backend ([`memory`]) backs the
//! engine's integration tests and lightweight embeddings.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::constants::JobType;
use crate::error::Result;
use crate::models::{BatchProgress, Checkpoint, CheckpointData, NewWorkItem, ScopeId, WorkItem};
use crate::state_machine::WorkItemStatus;

pub use memory::MemoryBackend;
pub use postgres::{PgCheckpointStore, PgWorkItemRepository, PgWorkSelector};

/// Durable key-value persistence keyed by `(job_type, scope_id, step)`.
///
/// Every `save` is an idempotent upsert: calling it twice with the same
/// arguments leaves the store in the same state as one call. This is the
/// property that makes benign re-invocation races harmless.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Upsert a checkpoint for the given key.
    async fn save(
        &self,
        job_type: JobType,
        scope: &ScopeId,
        step: &str,
        data: CheckpointData,
    ) -> Result<()>;

    /// Load a single checkpoint, or `None` if absent.
    async fn load(
        &self,
        job_type: JobType,
        scope: &ScopeId,
        step: &str,
    ) -> Result<Option<Checkpoint>>;

    /// Load all checkpoints for a scope, keyed by step name.
    async fn load_scope(
        &self,
        job_type: JobType,
        scope: &ScopeId,
    ) -> Result<HashMap<String, Checkpoint>>;

    /// Remove all checkpoints for a scope. Returns the number removed.
    async fn clear(&self, job_type: JobType, scope: &ScopeId) -> Result<u64>;

    /// Load the batch-wide progress checkpoint for a job type.
    async fn load_progress(&self, job_type: JobType) -> Result<Option<BatchProgress>>;

    /// Persist the batch-wide progress checkpoint.
    ///
    /// Callers are responsible for applying the completion rule via
    /// [`BatchProgress::stamp_completion`] before saving: `completed_at` must
    /// be set iff `processed_count == total_count` at the moment of the save.
    async fn save_progress(&self, job_type: JobType, progress: &BatchProgress) -> Result<()>;

    /// One-off schema compaction: fold historical checkpoints that used the
    /// ambiguous NULL-scope encoding into the global sentinel scope. Returns
    /// the number of rows rewritten. Bookkeeping only; a no-op on healthy
    /// stores.
    async fn compact_legacy_null_scopes(&self) -> Result<u64>;
}

/// Read/write access to work item status and payload in the business schema.
#[async_trait]
pub trait WorkItemRepository: Send + Sync {
    /// Create a new pending work item.
    async fn create(&self, new_item: NewWorkItem) -> Result<WorkItem>;

    /// Fetch a single item by id.
    async fn find(&self, item_id: Uuid) -> Result<Option<WorkItem>>;

    /// Transition an item's status, enforcing the state machine guards.
    async fn update_status(
        &self,
        item_id: Uuid,
        status: WorkItemStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    /// Record that an invocation visited this item.
    async fn touch(&self, item_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Operator recovery: flip all failed items for a job type back to
    /// pending. Returns the ids that were reset so the caller can clear
    /// their checkpoints.
    async fn reset_failed(&self, job_type: JobType) -> Result<Vec<Uuid>>;
}
