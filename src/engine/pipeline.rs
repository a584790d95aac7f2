//! # Step Pipeline
//!
//! The fixed ordered sequence of named steps a work item passes through, and
//! the derivation of the item's cursor from which checkpoints exist. A step
//! checkpoint, once written, is never recomputed: `next_step` simply returns
//! the first step lacking one.

use std::collections::HashMap;

use crate::constants::steps;
use crate::error::{BatchError, Result};
use crate::models::Checkpoint;

/// One named stage of a pipeline and the prior steps whose outputs it consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDefinition {
    pub name: &'static str,
    pub depends_on: &'static [&'static str],
}

impl StepDefinition {
    pub const fn new(name: &'static str, depends_on: &'static [&'static str]) -> Self {
        Self { name, depends_on }
    }
}

/// An ordered list of step definitions for one job type.
#[derive(Debug, Clone)]
pub struct StepPipeline {
    steps: Vec<StepDefinition>,
}

impl StepPipeline {
    /// Build a pipeline, validating that every dependency names an earlier step.
    pub fn new(steps: Vec<StepDefinition>) -> Result<Self> {
        for (position, step) in steps.iter().enumerate() {
            for dependency in step.depends_on {
                let found = steps[..position].iter().any(|prior| prior.name == *dependency);
                if !found {
                    return Err(BatchError::Configuration(format!(
                        "step '{}' depends on '{}' which is not an earlier step",
                        step.name, dependency
                    )));
                }
            }
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// The first step lacking a checkpoint, or `None` when the item is ready
    /// for finalization.
    pub fn next_step(&self, checkpoints: &HashMap<String, Checkpoint>) -> Option<&StepDefinition> {
        self.steps
            .iter()
            .find(|step| !checkpoints.contains_key(step.name))
    }

    /// Whether every step in the pipeline has a checkpoint.
    pub fn is_complete(&self, checkpoints: &HashMap<String, Checkpoint>) -> bool {
        self.next_step(checkpoints).is_none()
    }

    /// The AI report pipeline: research, then analysis over the research,
    /// then an evaluation consuming both.
    pub fn report_generation() -> Self {
        Self::new(vec![
            StepDefinition::new(steps::RESEARCH, &[]),
            StepDefinition::new(steps::ANALYSIS, &[steps::RESEARCH]),
            StepDefinition::new(steps::EVALUATION, &[steps::RESEARCH, steps::ANALYSIS]),
        ])
        .expect("built-in pipeline is well-formed")
    }

    /// The index mark-to-market/rebalance pipeline. History backfill is the
    /// sub-unit step (one missing trading day per unit).
    pub fn index_rebalance() -> Self {
        Self::new(vec![
            StepDefinition::new(steps::MARK_TO_MARKET, &[]),
            StepDefinition::new(steps::BACKFILL_HISTORY, &[steps::MARK_TO_MARKET]),
            StepDefinition::new(steps::REBALANCE, &[steps::MARK_TO_MARKET]),
        ])
        .expect("built-in pipeline is well-formed")
    }

    /// The flag reevaluation pipeline.
    pub fn flag_reevaluation() -> Self {
        Self::new(vec![
            StepDefinition::new(steps::REFRESH_QUOTE, &[]),
            StepDefinition::new(steps::REEVALUATE, &[steps::REFRESH_QUOTE]),
        ])
        .expect("built-in pipeline is well-formed")
    }
}
