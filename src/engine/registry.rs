//! # Job Registry
//!
//! Maps each job type to its pipeline and the capabilities that implement its
//! domain logic. The embedding application registers definitions at startup;
//! the engine only ever looks them up.

use std::collections::HashMap;
use std::sync::Arc;

use crate::constants::JobType;
use crate::engine::pipeline::StepPipeline;
use crate::engine::step_handler::{FinalizeHandler, StepHandler, SubUnitSource};

/// Everything the engine needs to run one job type.
pub struct JobDefinition {
    pub pipeline: StepPipeline,
    pub steps: Arc<dyn StepHandler>,
    pub finalize: Arc<dyn FinalizeHandler>,
    /// Present when one of the pipeline's steps decomposes into sub-units:
    /// the step's name and the source that enumerates/processes its units.
    pub sub_units: Option<(&'static str, Arc<dyn SubUnitSource>)>,
}

impl JobDefinition {
    pub fn new(
        pipeline: StepPipeline,
        steps: Arc<dyn StepHandler>,
        finalize: Arc<dyn FinalizeHandler>,
    ) -> Self {
        Self {
            pipeline,
            steps,
            finalize,
            sub_units: None,
        }
    }

    pub fn with_sub_units(
        mut self,
        step_name: &'static str,
        source: Arc<dyn SubUnitSource>,
    ) -> Self {
        self.sub_units = Some((step_name, source));
        self
    }

    /// The sub-unit source for a step, if that step is the decomposable one.
    pub fn sub_unit_source(&self, step_name: &str) -> Option<&Arc<dyn SubUnitSource>> {
        match &self.sub_units {
            Some((name, source)) if *name == step_name => Some(source),
            _ => None,
        }
    }
}

/// Registry of job definitions, populated once at startup.
#[derive(Default)]
pub struct JobRegistry {
    jobs: HashMap<JobType, Arc<JobDefinition>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: JobType, definition: JobDefinition) {
        self.jobs.insert(job_type, Arc::new(definition));
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<JobDefinition>> {
        self.jobs.get(&job_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<JobType> {
        self.jobs.keys().copied().collect()
    }
}
