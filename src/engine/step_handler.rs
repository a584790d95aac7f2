//! # Job Capability Traits
//!
//! The seams behind which each job type's domain logic lives: executing one
//! named step, finalizing a completed pipeline, and (for steps that decompose
//! into sub-units) enumerating and processing those units. The engine owns
//! sequencing, checkpoints, and time; implementations own market-data
//! fetches, LLM prompting, report compilation, and notification dispatch.
//!
//! Step functions must be pure with respect to durable state: they return
//! data, and only the finalize capability performs side effects. That
//! discipline is what upgrades the engine's at-least-once step execution to
//! at-most-once durable effects.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::models::WorkItem;

/// Failure reported by a step or finalize capability.
///
/// The variant is the retryability signal: transient failures leave the item
/// in processing for the next invocation, permanent ones mark it failed.
#[derive(Debug, Error)]
pub enum StepError {
    /// Rate limiting, provider overload, malformed upstream response. The
    /// handler is expected to have already retried with backoff before
    /// surfacing this.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Will never succeed if retried; requires operator attention.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

/// Outputs of the dependency steps a handler declared, keyed by step name.
pub type DependencyOutputs = HashMap<String, serde_json::Value>;

/// Executes one named step for a work item.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Run the step's pure function with its dependency outputs and the
    /// item's trigger payload, returning the step output to checkpoint.
    async fn execute(
        &self,
        step: &str,
        dependencies: &DependencyOutputs,
        item: &WorkItem,
    ) -> Result<serde_json::Value, StepError>;
}

/// Performs the one-time terminal side effects for a completed pipeline.
#[async_trait]
pub trait FinalizeHandler: Send + Sync {
    /// Produce the result entity from all step outputs and return its id.
    /// May call out to notification/email systems. Must tolerate being
    /// invoked for an item that already completed.
    async fn finalize(
        &self,
        outputs: &DependencyOutputs,
        item: &WorkItem,
    ) -> Result<String, StepError>;
}

/// Enumerates and processes the ordered sub-units of a decomposable step
/// (e.g. one calendar day of history to backfill per unit).
#[async_trait]
pub trait SubUnitSource: Send + Sync {
    /// Recompute the full ordered list of sub-units still outstanding for
    /// this item. Called on every resume; the engine does not trust the
    /// list to match the previous invocation's, since wall-clock time has
    /// passed.
    ///
    /// Units must come back in processing order, and their identifiers must
    /// sort lexicographically in that same order (ISO `YYYY-MM-DD` dates
    /// qualify): on resume the engine discards units whose identifier
    /// compares at or before the cursor's last-completed marker.
    async fn outstanding(&self, item: &WorkItem) -> Result<Vec<String>, StepError>;

    /// Process a single sub-unit.
    async fn process(&self, item: &WorkItem, unit: &str) -> Result<(), StepError>;
}
