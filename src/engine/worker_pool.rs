//! # Bounded Worker Pool
//!
//! The controlled-concurrency variant of the executor: a fixed number of
//! slots pull from a shared work list, each slot independently catching and
//! recording its own outcome. One item's failure never aborts or cancels its
//! siblings. Batch progress is persisted once from the collected outcomes
//! after the join.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use crate::constants::JobType;
use crate::engine::clock::TimeBudget;
use crate::engine::executor::{BatchRunReport, ItemOutcome, TimeBoxedExecutor};
use crate::engine::EngineError;
use crate::error::Result;
use crate::models::WorkItem;

/// Fan-out/join executor with a fixed number of concurrent slots.
pub struct WorkerPool {
    executor: Arc<TimeBoxedExecutor>,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(executor: Arc<TimeBoxedExecutor>) -> Self {
        let concurrency = executor.execution.worker_concurrency;
        Self {
            executor,
            concurrency,
        }
    }

    pub fn with_concurrency(executor: Arc<TimeBoxedExecutor>, concurrency: usize) -> Self {
        Self {
            executor,
            concurrency,
        }
    }

    /// Run one pooled invocation for a job type. Same semantics as the
    /// sequential executor, except up to `concurrency` items are in flight
    /// at once.
    pub async fn run_batch(&self, job_type: JobType) -> Result<BatchRunReport> {
        let executor = &self.executor;
        let job = executor
            .registry
            .get(job_type)
            .ok_or(EngineError::UnregisteredJob(job_type))?;
        let budget = TimeBudget::start(
            executor.clock.clone(),
            executor.execution.max_execution_time(),
        );

        let mut progress = executor.prepare_progress(job_type).await?;
        let batch = executor.select_batch(&job, job_type).await?;
        progress.total_count =
            progress.processed_count + executor.selector.count_outstanding(job_type).await?;

        let queue: Arc<Mutex<VecDeque<WorkItem>>> = Arc::new(Mutex::new(batch.into()));
        let outcomes: Arc<Mutex<Vec<(WorkItem, Result<ItemOutcome>)>>> =
            Arc::new(Mutex::new(Vec::new()));

        let workers = (0..self.concurrency).map(|slot| {
            let executor = executor.clone();
            let job = job.clone();
            let budget = budget.clone();
            let queue = queue.clone();
            let outcomes = outcomes.clone();
            async move {
                loop {
                    if budget.expired() {
                        break;
                    }
                    let Some(item) = queue.lock().pop_front() else {
                        break;
                    };
                    debug!(slot, item_id = %item.item_id, "Worker slot picked up item");
                    // Each slot captures its own outcome; an Err here is
                    // recorded, never propagated to sibling slots.
                    let outcome = executor.process_item(&job, &item, &budget).await;
                    outcomes.lock().push((item, outcome));
                }
            }
        });
        futures::future::join_all(workers).await;

        let mut report = BatchRunReport::new(job_type);
        let mut interrupted = !queue.lock().is_empty();

        let collected = std::mem::take(&mut *outcomes.lock());
        for (item, outcome) in collected {
            let keep_going = executor
                .record_outcome(job_type, &item, outcome, &mut progress, &mut report)
                .await?;
            if !keep_going {
                interrupted = true;
            }
        }

        progress.stamp_completion(executor.clock.utc_now());
        executor.store.save_progress(job_type, &progress).await?;

        let outstanding = executor.selector.count_outstanding(job_type).await?;
        report.has_more = interrupted || outstanding > 0;
        report.duration = budget.elapsed();
        Ok(report)
    }
}
