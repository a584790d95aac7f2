//! # Batch Engine
//!
//! The resumable, time-boxed batch-processing core. An external scheduler
//! invokes the engine on a fixed cadence; each invocation is a short-lived
//! sequential (or bounded-concurrency) pass over a batch of work items that
//! stops before the host's hard execution limit and persists enough state for
//! the next invocation to continue.
//!
//! ## Core Components
//!
//! - [`TimeBoxedExecutor`]: the driver loop; resumes each item from its last
//!   incomplete step, checks the wall-clock budget between items and steps,
//!   and persists batch progress after every item
//! - [`StepPipeline`](pipeline::StepPipeline): the fixed ordered sequence of
//!   named steps per job type; the item's cursor is derived from which
//!   checkpoints exist
//! - [`WorkSelector`](work_selector::WorkSelector): priority/staleness-ordered
//!   candidate selection with duplicate-target exclusion
//! - [`Finalizer`](finalizer::Finalizer): one-time terminal side effects once
//!   every step has a checkpoint
//! - [`WorkerPool`](worker_pool::WorkerPool): bounded fan-out/join variant
//!   where each slot captures its own outcome
//!
//! Step functions are pure by convention: they return data and perform no
//! durable side effects. Only the finalizer may send notifications or persist
//! result entities, which is what keeps at-least-once step execution safe.

pub mod clock;
pub mod error_classifier;
pub mod executor;
pub mod finalizer;
pub mod pipeline;
pub mod registry;
pub mod step_handler;
pub mod subtask;
pub mod work_selector;
pub mod worker_pool;

use thiserror::Error;
use uuid::Uuid;

use crate::constants::JobType;

pub use clock::{Clock, ManualClock, SystemClock, TimeBudget};
pub use error_classifier::{classify, ErrorDisposition};
pub use executor::{BatchRunReport, ItemOutcome, TimeBoxedExecutor};
pub use finalizer::{FinalizationResult, Finalizer};
pub use pipeline::{StepDefinition, StepPipeline};
pub use registry::{JobDefinition, JobRegistry};
pub use step_handler::{
    DependencyOutputs, FinalizeHandler, StepError, StepHandler, SubUnitSource,
};
pub use subtask::SubTaskOutcome;
pub use work_selector::{SelectorConfig, WorkSelector};
pub use worker_pool::WorkerPool;

/// Errors raised by the engine itself (as opposed to the store or config).
#[derive(Debug, Error)]
pub enum EngineError {
    /// A dependency checkpoint was absent when a step ran. Should never
    /// happen given ordered execution; defends against corrupted state.
    #[error("missing dependency checkpoint '{dependency}' for step '{step}'")]
    MissingDependency { step: String, dependency: String },

    /// A step function failed after exhausting its own retries.
    #[error("step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: StepError,
    },

    /// The finalize capability failed.
    #[error("finalization failed for item {item_id}: {source}")]
    FinalizationFailed {
        item_id: Uuid,
        #[source]
        source: StepError,
    },

    /// No pipeline registered for the requested job type.
    #[error("no job definition registered for '{0}'")]
    UnregisteredJob(JobType),

    /// A checkpoint held a payload of the wrong kind for its key.
    #[error("corrupt checkpoint data for scope '{scope}' step '{step}'")]
    CorruptCheckpoint { scope: String, step: String },
}
