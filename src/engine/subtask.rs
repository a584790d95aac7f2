//! # Sub-task Checkpoint Runner
//!
//! Drives a step that decomposes into many ordered sub-units, keeping a
//! secondary progress cursor independent of the item-level step checkpoint.
//! The cursor lives under the owning step's checkpoint key, so completing the
//! step (writing its output) atomically replaces the cursor — which is what
//! keeps Invariant 3: a cursor exists only while its owning step is
//! incomplete.

use serde_json::json;
use tracing::{debug, info};

use crate::constants::JobType;
use crate::engine::clock::TimeBudget;
use crate::engine::step_handler::{StepError, SubUnitSource};
use crate::engine::EngineError;
use crate::error::Result;
use crate::models::{CheckpointData, ScopeId, SubTaskCursor, WorkItem};
use crate::store::CheckpointStore;

/// Result of one visit to a sub-unit step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubTaskOutcome {
    /// Every sub-unit is done and the step checkpoint has been written.
    Completed { processed: u32 },
    /// The time budget ran out between sub-units; the cursor reflects all
    /// completed units and the next invocation resumes from it.
    Interrupted { processed: u32 },
}

/// Run (or resume) the sub-units of `step_name` for one item.
///
/// The outstanding list is recomputed on every visit rather than trusted
/// from last time: wall-clock time has passed and the owning condition may
/// have changed. If the list comes back empty the step completes without
/// any work.
pub async fn run_sub_units(
    store: &dyn CheckpointStore,
    source: &dyn SubUnitSource,
    job_type: JobType,
    item: &WorkItem,
    step_name: &str,
    budget: &TimeBudget,
) -> Result<SubTaskOutcome> {
    let scope = ScopeId::item(item.item_id.to_string());

    let mut cursor = match store.load(job_type, &scope, step_name).await? {
        Some(checkpoint) => match checkpoint.data.sub_task_cursor() {
            Some(cursor) => cursor.clone(),
            None => {
                // A step output under this key means the step already
                // completed; nothing to do.
                return Ok(SubTaskOutcome::Completed { processed: 0 });
            }
        },
        None => SubTaskCursor::new(0),
    };

    let outstanding = source
        .outstanding(item)
        .await
        .map_err(|source| EngineError::StepFailed {
            step: step_name.to_string(),
            source,
        })?;

    // Defensive skip: the recomputed list may still include units at or
    // before the last-completed marker if the source's view lags.
    let remaining: Vec<String> = match &cursor.last_completed {
        Some(last) => outstanding
            .into_iter()
            .filter(|unit| unit.as_str() > last.as_str())
            .collect(),
        None => outstanding,
    };

    cursor.total_count = cursor.completed_count + remaining.len() as u32;

    if remaining.is_empty() {
        return complete_step(store, job_type, &scope, step_name, &cursor).await;
    }

    debug!(
        job_type = %job_type,
        item_id = %item.item_id,
        step = %step_name,
        remaining = remaining.len(),
        resumed_from = cursor.last_completed.as_deref(),
        "Processing sub-units"
    );

    let mut processed_this_visit = 0;
    for unit in &remaining {
        if budget.expired() {
            return Ok(SubTaskOutcome::Interrupted {
                processed: processed_this_visit,
            });
        }

        source
            .process(item, unit)
            .await
            .map_err(|source| EngineError::StepFailed {
                step: step_name.to_string(),
                source,
            })?;

        cursor.advance(unit.clone());
        processed_this_visit += 1;
        store
            .save(
                job_type,
                &scope,
                step_name,
                CheckpointData::SubTask(cursor.clone()),
            )
            .await?;
    }

    complete_step(store, job_type, &scope, step_name, &cursor).await
}

async fn complete_step(
    store: &dyn CheckpointStore,
    job_type: JobType,
    scope: &ScopeId,
    step_name: &str,
    cursor: &SubTaskCursor,
) -> Result<SubTaskOutcome> {
    // Upserting the step output under the same key deletes the cursor.
    store
        .save(
            job_type,
            scope,
            step_name,
            CheckpointData::StepOutput {
                output: json!({
                    "sub_units_processed": cursor.completed_count,
                    "last_completed": cursor.last_completed,
                }),
            },
        )
        .await?;

    info!(
        job_type = %job_type,
        scope = %scope,
        step = %step_name,
        sub_units = cursor.completed_count,
        "Sub-unit step completed"
    );
    Ok(SubTaskOutcome::Completed {
        processed: cursor.completed_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::clock::{Clock, ManualClock, TimeBudget};
    use crate::models::NewWorkItem;
    use crate::store::{MemoryBackend, WorkItemRepository};
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    struct DaySource {
        days: Mutex<Vec<String>>,
        processed: Mutex<Vec<String>>,
        /// Advance the clock by this much per unit, to exercise interruption.
        cost_per_unit: Duration,
        clock: Arc<ManualClock>,
    }

    #[async_trait]
    impl SubUnitSource for DaySource {
        async fn outstanding(&self, _item: &WorkItem) -> std::result::Result<Vec<String>, StepError> {
            let processed = self.processed.lock();
            Ok(self
                .days
                .lock()
                .iter()
                .filter(|day| !processed.contains(day))
                .cloned()
                .collect())
        }

        async fn process(&self, _item: &WorkItem, unit: &str) -> std::result::Result<(), StepError> {
            self.clock.advance(self.cost_per_unit);
            self.processed.lock().push(unit.to_string());
            Ok(())
        }
    }

    async fn make_item(backend: &MemoryBackend) -> WorkItem {
        backend
            .create(NewWorkItem {
                job_type: JobType::IndexRebalance,
                target_id: "SPX-MOMENTUM".to_string(),
                priority: crate::constants::PriorityClass::Standard,
                payload: serde_json::json!({}),
            })
            .await
            .unwrap()
    }

    fn source(clock: Arc<ManualClock>, days: &[&str], cost: Duration) -> DaySource {
        DaySource {
            days: Mutex::new(days.iter().map(|s| s.to_string()).collect()),
            processed: Mutex::new(Vec::new()),
            cost_per_unit: cost,
            clock,
        }
    }

    #[tokio::test]
    async fn test_all_units_processed_writes_step_output() {
        let backend = MemoryBackend::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let item = make_item(&backend).await;
        let source = source(clock.clone(), &["2026-08-27", "2026-08-28"], Duration::ZERO);
        let budget = TimeBudget::start(clock, Duration::from_secs(50));

        let outcome = run_sub_units(
            &backend,
            &source,
            JobType::IndexRebalance,
            &item,
            "backfill_history",
            &budget,
        )
        .await
        .unwrap();

        assert_eq!(outcome, SubTaskOutcome::Completed { processed: 2 });
        let scope = ScopeId::item(item.item_id.to_string());
        let checkpoint = crate::store::CheckpointStore::load(
            &backend,
            JobType::IndexRebalance,
            &scope,
            "backfill_history",
        )
        .await
        .unwrap()
        .unwrap();
        // Invariant 3: the cursor is gone the instant the step completes.
        assert!(checkpoint.data.step_output().is_some());
    }

    #[tokio::test]
    async fn test_interruption_persists_cursor_and_resume_skips_done_units() {
        let backend = MemoryBackend::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let item = make_item(&backend).await;
        // Each unit consumes 30s against a 50s budget: the first unit fits,
        // the second trips the check.
        let source = source(
            clock.clone(),
            &["2026-08-26", "2026-08-27", "2026-08-28"],
            Duration::from_secs(30),
        );
        let budget = TimeBudget::start(clock.clone(), Duration::from_secs(50));

        let outcome = run_sub_units(
            &backend,
            &source,
            JobType::IndexRebalance,
            &item,
            "backfill_history",
            &budget,
        )
        .await
        .unwrap();
        assert_eq!(outcome, SubTaskOutcome::Interrupted { processed: 2 });

        let scope = ScopeId::item(item.item_id.to_string());
        let checkpoint = crate::store::CheckpointStore::load(
            &backend,
            JobType::IndexRebalance,
            &scope,
            "backfill_history",
        )
        .await
        .unwrap()
        .unwrap();
        let cursor = checkpoint.data.sub_task_cursor().unwrap();
        assert_eq!(cursor.completed_count, 2);
        assert_eq!(cursor.last_completed.as_deref(), Some("2026-08-27"));

        // Next invocation: fresh budget, remaining unit completes the step.
        let budget = TimeBudget::start(clock, Duration::from_secs(50));
        let outcome = run_sub_units(
            &backend,
            &source,
            JobType::IndexRebalance,
            &item,
            "backfill_history",
            &budget,
        )
        .await
        .unwrap();
        assert_eq!(outcome, SubTaskOutcome::Completed { processed: 3 });
        assert_eq!(
            source.processed.lock().as_slice(),
            &["2026-08-26".to_string(), "2026-08-27".to_string(), "2026-08-28".to_string()]
        );
    }

    #[tokio::test]
    async fn test_lagging_source_never_reprocesses_completed_units() {
        let backend = MemoryBackend::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let item = make_item(&backend).await;

        // Cursor from a previous invocation; the source's view lags and
        // still reports every day as outstanding.
        let mut cursor = SubTaskCursor::new(3);
        cursor.advance("2026-08-26");
        cursor.advance("2026-08-27");
        backend
            .save(
                JobType::IndexRebalance,
                &ScopeId::item(item.item_id.to_string()),
                "backfill_history",
                CheckpointData::SubTask(cursor),
            )
            .await
            .unwrap();

        let source = source(
            clock.clone(),
            &["2026-08-26", "2026-08-27", "2026-08-28"],
            Duration::ZERO,
        );
        let budget = TimeBudget::start(clock, Duration::from_secs(50));

        let outcome = run_sub_units(
            &backend,
            &source,
            JobType::IndexRebalance,
            &item,
            "backfill_history",
            &budget,
        )
        .await
        .unwrap();

        assert_eq!(outcome, SubTaskOutcome::Completed { processed: 3 });
        // Only the unit past the cursor actually ran.
        assert_eq!(source.processed.lock().as_slice(), &["2026-08-28".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_outstanding_completes_without_work() {
        let backend = MemoryBackend::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let item = make_item(&backend).await;
        let source = source(clock.clone(), &[], Duration::ZERO);
        let budget = TimeBudget::start(clock, Duration::from_secs(50));

        let outcome = run_sub_units(
            &backend,
            &source,
            JobType::IndexRebalance,
            &item,
            "backfill_history",
            &budget,
        )
        .await
        .unwrap();
        assert_eq!(outcome, SubTaskOutcome::Completed { processed: 0 });
    }
}
