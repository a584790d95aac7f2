//! # Work Selector
//!
//! Read-only selection of the next candidate batch for a job type. Ordering:
//! priority class first (paying users before free), then staleness (oldest
//! `last_processed_at` first, never-processed before everything), then
//! creation order. Candidates are excluded when another non-terminal item for
//! the same logical target was created earlier within the recency window, so
//! a business entity never has two concurrent pipelines.

use async_trait::async_trait;
use chrono::Duration;

use crate::config::ExecutionConfig;
use crate::constants::JobType;
use crate::error::Result;
use crate::models::WorkItem;

/// Selection policy knobs.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Recency window for duplicate-target exclusion.
    pub duplicate_window: Duration,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            duplicate_window: Duration::hours(24),
        }
    }
}

/// Selection policy is configured through the execution section
/// (`execution.duplicate_window_hours`), so deployments tune one knob.
impl From<&ExecutionConfig> for SelectorConfig {
    fn from(execution: &ExecutionConfig) -> Self {
        Self {
            duplicate_window: Duration::hours(execution.duplicate_window_hours),
        }
    }
}

/// Returns work items needing processing for a job type. Side-effect free.
#[async_trait]
pub trait WorkSelector: Send + Sync {
    /// Select up to `limit` items, ordered by priority, staleness, creation.
    async fn select(&self, job_type: JobType, limit: usize) -> Result<Vec<WorkItem>>;

    /// Count all items still needing processing for the job type, ignoring
    /// the batch limit. Used to size `BatchProgress.total_count` and to
    /// compute `has_more`.
    async fn count_outstanding(&self, job_type: JobType) -> Result<u32>;
}
