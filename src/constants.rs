//! # System Constants
//!
//! Shared enums and reserved values used across the batch engine: job types,
//! canonical step names, priority classes, and the sentinel scope used for
//! batch-wide progress checkpoints.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved scope identifier for job-wide (batch-level) checkpoints.
///
/// Item-level checkpoints use the work item's UUID as their scope; the
/// sentinel marks rows that belong to the job as a whole, such as the
/// [`BatchProgress`](crate::models::BatchProgress) cursor.
pub const GLOBAL_SCOPE: &str = "__global__";

/// Step name under which the batch progress checkpoint is stored.
pub const BATCH_PROGRESS_STEP: &str = "batch_progress";

/// Daily batch jobs driven by the external scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Mark-to-market and rebalancing of model indices
    IndexRebalance,
    /// AI research report generation for ranked tickers
    ReportGeneration,
    /// Reevaluation of stale screening flags
    FlagReevaluation,
}

impl JobType {
    pub fn all() -> &'static [JobType] {
        &[
            JobType::IndexRebalance,
            JobType::ReportGeneration,
            JobType::FlagReevaluation,
        ]
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexRebalance => write!(f, "index_rebalance"),
            Self::ReportGeneration => write!(f, "report_generation"),
            Self::FlagReevaluation => write!(f, "flag_reevaluation"),
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "index_rebalance" => Ok(Self::IndexRebalance),
            "report_generation" => Ok(Self::ReportGeneration),
            "flag_reevaluation" => Ok(Self::FlagReevaluation),
            _ => Err(format!("Invalid job type: {s}")),
        }
    }
}

/// Priority class for work selection ordering. Paying users come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    Premium,
    Standard,
}

impl PriorityClass {
    /// Sort rank used by work selectors (lower runs first).
    pub fn rank(&self) -> i16 {
        match self {
            Self::Premium => 0,
            Self::Standard => 1,
        }
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Premium => write!(f, "premium"),
            Self::Standard => write!(f, "standard"),
        }
    }
}

impl std::str::FromStr for PriorityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "premium" => Ok(Self::Premium),
            "standard" => Ok(Self::Standard),
            _ => Err(format!("Invalid priority class: {s}")),
        }
    }
}

/// Canonical step names for the built-in pipelines.
pub mod steps {
    /// Report generation pipeline
    pub const RESEARCH: &str = "research";
    pub const ANALYSIS: &str = "analysis";
    pub const EVALUATION: &str = "evaluation";

    /// Index rebalance pipeline
    pub const MARK_TO_MARKET: &str = "mark_to_market";
    pub const BACKFILL_HISTORY: &str = "backfill_history";
    pub const REBALANCE: &str = "rebalance";

    /// Flag reevaluation pipeline
    pub const REFRESH_QUOTE: &str = "refresh_quote";
    pub const REEVALUATE: &str = "reevaluate";
}
