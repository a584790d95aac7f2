#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # AlphaRank Batch
//!
//! Resumable, time-boxed batch-processing engine for AlphaRank's scheduled
//! analysis jobs.
//!
//! ## Overview
//!
//! AlphaRank's heavy jobs (deep report generation, index rebalancing, flag
//! re-evaluation) run far longer than any single serverless invocation is
//! allowed to. The engine splits each job into a fixed pipeline of
//! checkpointed steps, runs as many as fit inside a wall-clock budget, and
//! persists enough state that the next scheduler tick resumes mid-item and
//! even mid-step without redoing completed work.
//!
//! ## Key Properties
//!
//! - **Idempotent invocations**: re-running a tick never duplicates side
//!   effects; completed steps are skipped via their checkpoints
//! - **Time-boxed execution**: the budget is checked cooperatively between
//!   items, steps, and sub-units, so interruption is orderly, never abrupt
//! - **Failure isolation**: one item failing permanently never blocks the
//!   rest of the batch
//! - **Pure steps, effectful finalizer**: durable side effects happen
//!   exactly once, in the finalizer, after every step has a checkpoint
//!
//! ## Module Organization
//!
//! - [`engine`] - Executor, pipelines, finalizer, worker pool, time budget
//! - [`store`] - Checkpoint and work-item persistence (Postgres + in-memory)
//! - [`models`] - Work items, checkpoints, sub-task cursors, batch progress
//! - [`state_machine`] - Work-item status transitions
//! - [`config`] - Layered configuration management
//! - [`web`] - Authenticated HTTP trigger surface for the scheduler
//! - [`resilience`] - Bounded exponential backoff for transient step errors
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use alpharank_batch::config::BatchConfig;
//! use alpharank_batch::constants::JobType;
//! use alpharank_batch::engine::{JobRegistry, SystemClock, TimeBoxedExecutor};
//! use alpharank_batch::store::MemoryBackend;
//! use std::sync::Arc;
//!
//! # async fn example() -> alpharank_batch::error::Result<()> {
//! let config = BatchConfig::default();
//! let backend = Arc::new(MemoryBackend::new());
//! let mut registry = JobRegistry::new();
//! // registry.register(JobType::ReportGeneration, report_generation_definition());
//!
//! let executor = TimeBoxedExecutor::new(
//!     backend.clone(),
//!     backend.clone(),
//!     backend,
//!     Arc::new(registry),
//!     Arc::new(SystemClock),
//!     config.execution.clone(),
//! );
//! let report = executor.run_batch(JobType::ReportGeneration).await?;
//! println!("processed {} items, has_more={}", report.processed, report.has_more);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod resilience;
pub mod state_machine;
pub mod store;
pub mod web;

pub use config::{BackoffConfig, BatchConfig, DatabaseConfig, ExecutionConfig, WebConfig};
pub use constants::{JobType, PriorityClass};
pub use engine::{
    BatchRunReport, Clock, EngineError, ItemOutcome, JobDefinition, JobRegistry, StepError,
    StepHandler, StepPipeline, SystemClock, TimeBoxedExecutor, WorkerPool,
};
pub use error::{BatchError, Result};
pub use models::{BatchProgress, Checkpoint, CheckpointData, ScopeId, SubTaskCursor, WorkItem};
pub use state_machine::states::WorkItemStatus;
pub use store::{CheckpointStore, WorkItemRepository};
