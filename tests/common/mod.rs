//! Shared test doubles: scripted step handlers, a recording finalizer, and a
//! harness that wires an executor over the in-memory backend with a manually
//! advanced clock.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use alpharank_batch::config::ExecutionConfig;
use alpharank_batch::constants::{JobType, PriorityClass};
use alpharank_batch::engine::{
    DependencyOutputs, FinalizeHandler, JobDefinition, JobRegistry, ManualClock, SelectorConfig,
    StepError, StepHandler, StepPipeline, SubUnitSource, TimeBoxedExecutor, WorkerPool,
};
use alpharank_batch::models::{NewWorkItem, WorkItem};
use alpharank_batch::store::MemoryBackend;

#[derive(Clone, Copy)]
pub enum FailureMode {
    /// Fails every attempt.
    Permanent,
    /// Fails once, then succeeds on retry.
    TransientOnce,
}

/// Step handler that records every call, advances the manual clock by a
/// fixed cost per step, and fails where scripted.
pub struct ScriptedSteps {
    pub calls: Mutex<Vec<(Uuid, String)>>,
    clock: Arc<ManualClock>,
    cost_per_step: Duration,
    failures: Mutex<HashMap<(String, String), FailureMode>>,
}

impl ScriptedSteps {
    pub fn new(clock: Arc<ManualClock>, cost_per_step: Duration) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            clock,
            cost_per_step,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Script a failure for (target_id, step).
    pub fn fail(&self, target_id: &str, step: &str, mode: FailureMode) {
        self.failures
            .lock()
            .insert((target_id.to_string(), step.to_string()), mode);
    }

    pub fn calls_for(&self, item_id: Uuid) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(id, _)| *id == item_id)
            .map(|(_, step)| step.clone())
            .collect()
    }
}

#[async_trait]
impl StepHandler for ScriptedSteps {
    async fn execute(
        &self,
        step: &str,
        _dependencies: &DependencyOutputs,
        item: &WorkItem,
    ) -> Result<serde_json::Value, StepError> {
        self.calls
            .lock()
            .push((item.item_id, step.to_string()));

        let key = (item.target_id.clone(), step.to_string());
        let scripted = {
            let mut failures = self.failures.lock();
            match failures.get(&key) {
                Some(FailureMode::Permanent) => Some(FailureMode::Permanent),
                Some(FailureMode::TransientOnce) => {
                    failures.remove(&key);
                    Some(FailureMode::TransientOnce)
                }
                None => None,
            }
        };
        match scripted {
            Some(FailureMode::Permanent) => {
                return Err(StepError::Permanent(format!(
                    "scripted permanent failure in {step}"
                )))
            }
            Some(FailureMode::TransientOnce) => {
                return Err(StepError::Transient(format!(
                    "scripted transient failure in {step}"
                )))
            }
            None => {}
        }

        self.clock.advance(self.cost_per_step);
        Ok(serde_json::json!({ "step": step, "target": item.target_id }))
    }
}

/// Finalizer that records which items it produced results for.
#[derive(Default)]
pub struct RecordingFinalizer {
    pub finalized: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl FinalizeHandler for RecordingFinalizer {
    async fn finalize(
        &self,
        _outputs: &DependencyOutputs,
        item: &WorkItem,
    ) -> Result<String, StepError> {
        self.finalized.lock().push(item.item_id);
        Ok(format!("report-{}", item.item_id))
    }
}

/// Sub-unit source over a fixed list of trading days, each costing a fixed
/// amount of clock time to process.
pub struct DayBackfillSource {
    days: Vec<String>,
    pub processed: Mutex<Vec<String>>,
    clock: Arc<ManualClock>,
    cost_per_unit: Duration,
}

impl DayBackfillSource {
    pub fn new(clock: Arc<ManualClock>, days: &[&str], cost_per_unit: Duration) -> Self {
        Self {
            days: days.iter().map(|d| d.to_string()).collect(),
            processed: Mutex::new(Vec::new()),
            clock,
            cost_per_unit,
        }
    }
}

#[async_trait]
impl SubUnitSource for DayBackfillSource {
    async fn outstanding(&self, _item: &WorkItem) -> Result<Vec<String>, StepError> {
        let processed = self.processed.lock();
        Ok(self
            .days
            .iter()
            .filter(|day| !processed.contains(day))
            .cloned()
            .collect())
    }

    async fn process(&self, _item: &WorkItem, unit: &str) -> Result<(), StepError> {
        self.clock.advance(self.cost_per_unit);
        self.processed.lock().push(unit.to_string());
        Ok(())
    }
}

/// Executor over the in-memory backend with scripted capabilities.
pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub clock: Arc<ManualClock>,
    pub steps: Arc<ScriptedSteps>,
    pub finalizer: Arc<RecordingFinalizer>,
    pub executor: Arc<TimeBoxedExecutor>,
}

impl Harness {
    /// Harness for the report generation pipeline with a 50s budget.
    pub fn report_generation(cost_per_step: Duration) -> Self {
        Self::build(
            JobType::ReportGeneration,
            StepPipeline::report_generation(),
            cost_per_step,
            None,
        )
        .0
    }

    /// Harness for index rebalancing, with the backfill step decomposed into
    /// one sub-unit per trading day.
    pub fn index_rebalance(
        cost_per_step: Duration,
        days: &[&str],
        cost_per_unit: Duration,
    ) -> (Self, Arc<DayBackfillSource>) {
        let (harness, source) = Self::build(
            JobType::IndexRebalance,
            StepPipeline::index_rebalance(),
            cost_per_step,
            Some((days.to_vec(), cost_per_unit)),
        );
        (harness, source.expect("sub-unit source was configured"))
    }

    fn build(
        job_type: JobType,
        pipeline: StepPipeline,
        cost_per_step: Duration,
        sub_units: Option<(Vec<&str>, Duration)>,
    ) -> (Self, Option<Arc<DayBackfillSource>>) {
        let execution = ExecutionConfig {
            max_execution_time_ms: 50_000,
            batch_size: 10,
            worker_concurrency: 2,
            duplicate_window_hours: 24,
            calendar_offset_minutes: 0,
        };
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let backend = Arc::new(
            MemoryBackend::with_selector_config(SelectorConfig::from(&execution))
                .with_clock(clock.clone()),
        );
        let steps = Arc::new(ScriptedSteps::new(clock.clone(), cost_per_step));
        let finalizer = Arc::new(RecordingFinalizer::default());

        let mut definition =
            JobDefinition::new(pipeline, steps.clone(), finalizer.clone());
        let source = sub_units.map(|(days, cost_per_unit)| {
            Arc::new(DayBackfillSource::new(clock.clone(), &days, cost_per_unit))
        });
        if let Some(source) = &source {
            definition = definition.with_sub_units(
                alpharank_batch::constants::steps::BACKFILL_HISTORY,
                source.clone(),
            );
        }
        let mut registry = JobRegistry::new();
        registry.register(job_type, definition);

        let executor = Arc::new(TimeBoxedExecutor::new(
            backend.clone(),
            backend.clone(),
            backend.clone(),
            Arc::new(registry),
            clock.clone(),
            execution,
        ));

        let harness = Self {
            backend,
            clock,
            steps,
            finalizer,
            executor,
        };
        (harness, source)
    }

    pub fn worker_pool(&self, concurrency: usize) -> WorkerPool {
        WorkerPool::with_concurrency(self.executor.clone(), concurrency)
    }

    /// Seed one pending work item with a distinct creation time.
    pub fn seed_item(&self, job_type: JobType, target: &str, minutes_ago: i64) -> WorkItem {
        let item = WorkItem::from_new(
            NewWorkItem {
                job_type,
                target_id: target.to_string(),
                priority: PriorityClass::Standard,
                payload: serde_json::json!({}),
            },
            Utc::now() - chrono::Duration::minutes(minutes_ago),
        );
        self.backend.insert_item(item.clone());
        item
    }
}
