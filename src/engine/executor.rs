//! # Time-Boxed Executor
//!
//! The driver loop. Each invocation selects a batch, resumes every item from
//! its last incomplete step, and stops between items (or between steps and
//! sub-units) once the wall-clock budget is spent — deliberately below the
//! host platform's hard limit so the response can still be written. Progress
//! is persisted after every item, so an interruption never loses more than
//! one item's work.
//!
//! Per-item errors are caught at the item-iteration boundary and never abort
//! the batch: they are classified as retryable (item left in processing) or
//! structural (item failed), recorded on the batch progress, and processing
//! continues with the next item.

use chrono::FixedOffset;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ExecutionConfig;
use crate::constants::JobType;
use crate::engine::clock::{Clock, TimeBudget};
use crate::engine::error_classifier::{classify, ErrorDisposition};
use crate::engine::finalizer::{FinalizationResult, Finalizer};
use crate::engine::pipeline::StepDefinition;
use crate::engine::registry::{JobDefinition, JobRegistry};
use crate::engine::step_handler::DependencyOutputs;
use crate::engine::subtask::{self, SubTaskOutcome};
use crate::engine::work_selector::WorkSelector;
use crate::engine::EngineError;
use crate::error::Result;
use crate::logging::{log_batch_operation, log_step_operation};
use crate::models::{BatchProgress, Checkpoint, CheckpointData, ScopeId, WorkItem};
use crate::state_machine::WorkItemStatus;
use crate::store::{CheckpointStore, WorkItemRepository};

/// Result of one visit to a single work item within an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// All steps checkpointed and terminal effects performed.
    Finalized { result_id: String },
    /// The item needed nothing (already in a terminal state).
    AlreadySatisfied,
    /// The time budget ran out mid-pipeline; partial progress is durable and
    /// the next invocation resumes from it. Not an error.
    Interrupted,
}

/// Summary of one invocation, surfaced to the scheduler.
#[derive(Debug, Clone)]
pub struct BatchRunReport {
    pub job_type: JobType,
    /// Items whose visit ran to an outcome this invocation (including failures).
    pub processed: u32,
    /// Items that reached finalization this invocation.
    pub finalized: u32,
    pub errors: Vec<String>,
    /// Another invocation is required to finish the batch.
    pub has_more: bool,
    pub duration: Duration,
}

impl BatchRunReport {
    pub(crate) fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            processed: 0,
            finalized: 0,
            errors: Vec::new(),
            has_more: false,
            duration: Duration::ZERO,
        }
    }
}

enum StepRun {
    Checkpointed,
    Interrupted,
}

/// The sequential driver loop.
pub struct TimeBoxedExecutor {
    pub(crate) store: Arc<dyn CheckpointStore>,
    pub(crate) items: Arc<dyn WorkItemRepository>,
    pub(crate) selector: Arc<dyn WorkSelector>,
    pub(crate) registry: Arc<JobRegistry>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) execution: ExecutionConfig,
    finalizer: Finalizer,
}

impl TimeBoxedExecutor {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        items: Arc<dyn WorkItemRepository>,
        selector: Arc<dyn WorkSelector>,
        registry: Arc<JobRegistry>,
        clock: Arc<dyn Clock>,
        execution: ExecutionConfig,
    ) -> Self {
        let finalizer = Finalizer::new(store.clone(), items.clone());
        Self {
            store,
            items,
            selector,
            registry,
            clock,
            execution,
            finalizer,
        }
    }

    /// Run one sequential invocation for a job type.
    pub async fn run_batch(&self, job_type: JobType) -> Result<BatchRunReport> {
        let job = self
            .registry
            .get(job_type)
            .ok_or(EngineError::UnregisteredJob(job_type))?;
        let budget = TimeBudget::start(self.clock.clone(), self.execution.max_execution_time());

        let mut progress = self.prepare_progress(job_type).await?;
        let batch = self.select_batch(&job, job_type).await?;
        progress.total_count =
            progress.processed_count + self.selector.count_outstanding(job_type).await?;

        log_batch_operation(
            "run_batch_started",
            &job_type.to_string(),
            Some(progress.processed_count),
            Some(progress.total_count),
            "started",
            None,
        );

        let mut report = BatchRunReport::new(job_type);
        let mut interrupted = false;

        for item in &batch {
            // Cooperative timeout: never start an item past the budget.
            if budget.expired() {
                interrupted = true;
                break;
            }

            let outcome = self.process_item(&job, item, &budget).await;
            let keep_going = self
                .record_outcome(job_type, item, outcome, &mut progress, &mut report)
                .await?;

            // Progress is persisted after every item so an interruption
            // never loses more than one item's work.
            progress.stamp_completion(self.clock.utc_now());
            self.store.save_progress(job_type, &progress).await?;

            if !keep_going {
                interrupted = true;
                break;
            }
        }

        let outstanding = self.selector.count_outstanding(job_type).await?;
        report.has_more = interrupted || outstanding > 0;
        report.duration = budget.elapsed();

        log_batch_operation(
            "run_batch_finished",
            &job_type.to_string(),
            Some(progress.processed_count),
            Some(progress.total_count),
            if report.errors.is_empty() { "ok" } else { "partial" },
            Some(&format!(
                "finalized={} has_more={} duration={:?}",
                report.finalized, report.has_more, report.duration
            )),
        );
        Ok(report)
    }

    /// Kick off the one-off checkpoint schema compaction (§ migration op).
    pub async fn compact_legacy_checkpoints(&self) -> Result<u64> {
        self.store.compact_legacy_null_scopes().await
    }

    /// Operator recovery: re-queue failed items and drop their checkpoints.
    pub async fn reset_failed(&self, job_type: JobType) -> Result<u64> {
        let reset = self.items.reset_failed(job_type).await?;
        for item_id in &reset {
            let scope = ScopeId::item(item_id.to_string());
            self.store.clear(job_type, &scope).await?;
        }
        if !reset.is_empty() {
            info!(job_type = %job_type, count = reset.len(), "Failed items reset to pending");
        }
        Ok(reset.len() as u64)
    }

    /// Load batch progress, resetting it when it belongs to a previous
    /// trading day (Invariant 2: these are daily jobs; yesterday's completed
    /// batch means everything to do again today).
    pub(crate) async fn prepare_progress(&self, job_type: JobType) -> Result<BatchProgress> {
        let now = self.clock.utc_now();
        let offset = FixedOffset::east_opt(self.execution.calendar_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));

        let mut progress = self
            .store
            .load_progress(job_type)
            .await?
            .unwrap_or_default();

        if progress.is_stale(now, offset) {
            info!(
                job_type = %job_type,
                completed_at = ?progress.completed_at,
                "Batch progress from a previous trading day; resetting"
            );
            progress = BatchProgress::empty();
        }
        Ok(progress)
    }

    /// Select the batch and move items with pending sub-task cursors to the
    /// front, so partial work finishes before new items start.
    pub(crate) async fn select_batch(
        &self,
        job: &Arc<JobDefinition>,
        job_type: JobType,
    ) -> Result<Vec<WorkItem>> {
        let selected = self
            .selector
            .select(job_type, self.execution.batch_size)
            .await?;

        let Some((step_name, _)) = &job.sub_units else {
            return Ok(selected);
        };

        let mut resumable = Vec::new();
        let mut fresh = Vec::new();
        for item in selected {
            let scope = ScopeId::item(item.item_id.to_string());
            let has_cursor = matches!(
                self.store.load(job_type, &scope, step_name).await?,
                Some(Checkpoint { data: CheckpointData::SubTask(_), .. })
            );
            if has_cursor {
                resumable.push(item);
            } else {
                fresh.push(item);
            }
        }
        resumable.extend(fresh);
        Ok(resumable)
    }

    /// Visit one item: take ownership, run steps from the derived cursor,
    /// finalize when the pipeline is exhausted.
    pub(crate) async fn process_item(
        &self,
        job: &Arc<JobDefinition>,
        item: &WorkItem,
        budget: &TimeBudget,
    ) -> Result<ItemOutcome> {
        match item.status {
            WorkItemStatus::Pending => {
                // Ownership marker: flipped before any step executes.
                self.items
                    .update_status(item.item_id, WorkItemStatus::Processing, None)
                    .await?;
            }
            WorkItemStatus::Processing => {
                debug!(item_id = %item.item_id, "Resuming item left processing by a previous invocation");
            }
            WorkItemStatus::Completed | WorkItemStatus::Failed => {
                warn!(item_id = %item.item_id, status = %item.status, "Terminal item reached the executor; skipping");
                return Ok(ItemOutcome::AlreadySatisfied);
            }
        }

        self.items.touch(item.item_id, self.clock.utc_now()).await?;
        let scope = ScopeId::item(item.item_id.to_string());

        loop {
            let checkpoints = self.store.load_scope(item.job_type, &scope).await?;
            match job.pipeline.next_step(&checkpoints) {
                None => {
                    // Re-read the item: its status may have advanced if a
                    // previous finalization attempt half-succeeded.
                    let current = self
                        .items
                        .find(item.item_id)
                        .await?
                        .unwrap_or_else(|| item.clone());
                    let result = self
                        .finalizer
                        .finalize_item(job, &current, &checkpoints)
                        .await?;
                    return Ok(match result {
                        FinalizationResult::Finalized { result_id } => {
                            ItemOutcome::Finalized { result_id }
                        }
                        FinalizationResult::AlreadyCompleted => ItemOutcome::AlreadySatisfied,
                    });
                }
                Some(step) => {
                    if budget.expired() {
                        return Ok(ItemOutcome::Interrupted);
                    }
                    match self.execute_step(job, item, step, &checkpoints, budget).await? {
                        StepRun::Checkpointed => {}
                        StepRun::Interrupted => return Ok(ItemOutcome::Interrupted),
                    }
                }
            }
        }
    }

    async fn execute_step(
        &self,
        job: &Arc<JobDefinition>,
        item: &WorkItem,
        step: &StepDefinition,
        checkpoints: &std::collections::HashMap<String, Checkpoint>,
        budget: &TimeBudget,
    ) -> Result<StepRun> {
        let scope = ScopeId::item(item.item_id.to_string());

        // Fail fast on missing dependencies. Ordered execution makes this
        // unreachable unless checkpoint state was corrupted.
        let mut dependencies = DependencyOutputs::new();
        for dependency in step.depends_on {
            let checkpoint =
                checkpoints
                    .get(*dependency)
                    .ok_or_else(|| EngineError::MissingDependency {
                        step: step.name.to_string(),
                        dependency: dependency.to_string(),
                    })?;
            let output =
                checkpoint
                    .data
                    .step_output()
                    .ok_or_else(|| EngineError::CorruptCheckpoint {
                        scope: item.item_id.to_string(),
                        step: dependency.to_string(),
                    })?;
            dependencies.insert(dependency.to_string(), output.clone());
        }

        if let Some(source) = job.sub_unit_source(step.name) {
            let outcome = subtask::run_sub_units(
                self.store.as_ref(),
                source.as_ref(),
                item.job_type,
                item,
                step.name,
                budget,
            )
            .await?;
            return Ok(match outcome {
                SubTaskOutcome::Completed { .. } => StepRun::Checkpointed,
                SubTaskOutcome::Interrupted { .. } => StepRun::Interrupted,
            });
        }

        let output = job
            .steps
            .execute(step.name, &dependencies, item)
            .await
            .map_err(|source| EngineError::StepFailed {
                step: step.name.to_string(),
                source,
            })?;

        self.store
            .save(
                item.job_type,
                &scope,
                step.name,
                CheckpointData::StepOutput { output },
            )
            .await?;

        log_step_operation(
            "step_checkpointed",
            &item.job_type.to_string(),
            Some(&item.item_id.to_string()),
            Some(step.name),
            "completed",
            None,
        );
        Ok(StepRun::Checkpointed)
    }

    /// Fold one item's outcome into progress and the run report. Returns
    /// `false` when the loop must stop (budget interruption).
    pub(crate) async fn record_outcome(
        &self,
        job_type: JobType,
        item: &WorkItem,
        outcome: Result<ItemOutcome>,
        progress: &mut BatchProgress,
        report: &mut BatchRunReport,
    ) -> Result<bool> {
        let item_scope = item.item_id.to_string();
        match outcome {
            Ok(ItemOutcome::Finalized { .. }) => {
                progress.record_item(&item_scope);
                report.processed += 1;
                report.finalized += 1;
                Ok(true)
            }
            Ok(ItemOutcome::AlreadySatisfied) => {
                progress.record_item(&item_scope);
                report.processed += 1;
                Ok(true)
            }
            Ok(ItemOutcome::Interrupted) => Ok(false),
            Err(error) => {
                let message = format!("{item_scope}: {error}");
                crate::logging::log_error(
                    "executor",
                    "process_item",
                    &message,
                    Some(&job_type.to_string()),
                );

                match classify(&error) {
                    ErrorDisposition::Retry => {
                        // Left in processing; the next invocation retries.
                    }
                    ErrorDisposition::Fail => {
                        self.items
                            .update_status(item.item_id, WorkItemStatus::Failed, Some(&message))
                            .await?;
                    }
                }

                progress.errors.push(message.clone());
                progress.record_item(&item_scope);
                report.errors.push(message);
                report.processed += 1;
                Ok(true)
            }
        }
    }
}
