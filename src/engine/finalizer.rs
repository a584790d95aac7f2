//! # Finalizer
//!
//! Performs the one-time terminal effects once every step of an item's
//! pipeline has a checkpoint: invoke the job's finalize capability, mark the
//! item completed, and clear its checkpoints. Finalization must be safe to
//! attempt twice because item status and batch progress are updated in
//! separate writes — a crash between them leaves an already-completed item
//! that the next attempt treats as a no-op.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::registry::JobDefinition;
use crate::engine::step_handler::DependencyOutputs;
use crate::engine::EngineError;
use crate::error::Result;
use crate::models::{Checkpoint, ScopeId, WorkItem};
use crate::state_machine::WorkItemStatus;
use crate::store::{CheckpointStore, WorkItemRepository};

/// Outcome of a finalization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizationResult {
    /// Result entity persisted and item completed.
    Finalized { result_id: String },
    /// The item was already completed; nothing was done.
    AlreadyCompleted,
}

/// Engine wrapper around the job's finalize capability.
pub struct Finalizer {
    store: Arc<dyn CheckpointStore>,
    items: Arc<dyn WorkItemRepository>,
}

impl Finalizer {
    pub fn new(store: Arc<dyn CheckpointStore>, items: Arc<dyn WorkItemRepository>) -> Self {
        Self { store, items }
    }

    /// Finalize one item whose pipeline is fully checkpointed.
    pub async fn finalize_item(
        &self,
        job: &JobDefinition,
        item: &WorkItem,
        checkpoints: &HashMap<String, Checkpoint>,
    ) -> Result<FinalizationResult> {
        if item.status == WorkItemStatus::Completed {
            warn!(item_id = %item.item_id, "Finalization re-attempted on completed item; no-op");
            return Ok(FinalizationResult::AlreadyCompleted);
        }

        let outputs = collect_outputs(item.item_id, job, checkpoints)?;

        let result_id = job
            .finalize
            .finalize(&outputs, item)
            .await
            .map_err(|source| EngineError::FinalizationFailed {
                item_id: item.item_id,
                source,
            })?;

        self.items
            .update_status(item.item_id, WorkItemStatus::Completed, None)
            .await?;

        let scope = ScopeId::item(item.item_id.to_string());
        self.store.clear(item.job_type, &scope).await?;

        info!(
            job_type = %item.job_type,
            item_id = %item.item_id,
            result_id = %result_id,
            "Item finalized"
        );
        Ok(FinalizationResult::Finalized { result_id })
    }
}

/// Gather every step's output, failing fast on gaps or non-output payloads.
fn collect_outputs(
    item_id: Uuid,
    job: &JobDefinition,
    checkpoints: &HashMap<String, Checkpoint>,
) -> Result<DependencyOutputs> {
    let mut outputs: HashMap<String, Value> = HashMap::new();
    for step in job.pipeline.steps() {
        let checkpoint =
            checkpoints
                .get(step.name)
                .ok_or_else(|| EngineError::MissingDependency {
                    step: "finalize".to_string(),
                    dependency: step.name.to_string(),
                })?;
        let output = checkpoint
            .data
            .step_output()
            .ok_or_else(|| EngineError::CorruptCheckpoint {
                scope: item_id.to_string(),
                step: step.name.to_string(),
            })?;
        outputs.insert(step.name.to_string(), output.clone());
    }
    Ok(outputs)
}
