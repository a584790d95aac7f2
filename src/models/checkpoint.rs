//! # Checkpoint Model
//!
//! Durable progress records keyed by `(job_type, scope_id, step)`. A step
//! checkpoint, once written, is never recomputed: its presence is the sole
//! "is this step done" signal. Batch-wide progress lives under the reserved
//! [`GLOBAL_SCOPE`](crate::constants::GLOBAL_SCOPE) sentinel.
//!
//! ## Database Schema
//!
//! Maps to the `alpharank_checkpoints` table:
//! ```sql
//! CREATE TABLE alpharank_checkpoints (
//!   id BIGSERIAL PRIMARY KEY,
//!   job_type VARCHAR NOT NULL,
//!   scope_id VARCHAR, -- NULL only in pre-sentinel legacy rows
//!   step VARCHAR NOT NULL,
//!   data JSONB NOT NULL,
//!   created_at TIMESTAMPTZ NOT NULL,
//!   updated_at TIMESTAMPTZ NOT NULL,
//!   UNIQUE (job_type, scope_id, step)
//! );
//! ```
//!
//! The unique key makes every save an idempotent upsert, which is what lets
//! the engine tolerate benign re-invocation races.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::GLOBAL_SCOPE;

/// What a checkpoint belongs to: a specific work item, or the job as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeId {
    /// Item-level checkpoint, keyed by the work item's UUID string.
    Item(String),
    /// Job-wide checkpoint, stored under the reserved sentinel value.
    Global,
}

impl ScopeId {
    pub fn item(id: impl Into<String>) -> Self {
        Self::Item(id.into())
    }

    /// Database encoding of this scope.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Item(id) => id,
            Self::Global => GLOBAL_SCOPE,
        }
    }

    /// Decode a stored scope string.
    pub fn from_stored(raw: &str) -> Self {
        if raw == GLOBAL_SCOPE {
            Self::Global
        } else {
            Self::Item(raw.to_string())
        }
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durable progress record for one `(job_type, scope_id, step)` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub scope_id: ScopeId,
    pub step: String,
    pub data: CheckpointData,
    pub created_at: DateTime<Utc>,
}

/// Tagged union of checkpoint payloads.
///
/// The engine-owned payloads (sub-task cursors, batch progress) carry a known
/// shape; step outputs stay opaque to the engine and are decoded by the step
/// that declared the dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckpointData {
    /// Output of a completed pipeline step.
    StepOutput { output: serde_json::Value },
    /// Secondary progress cursor for a step that decomposes into sub-units.
    SubTask(SubTaskCursor),
    /// Batch-wide progress, stored only under the global sentinel scope.
    Progress(BatchProgress),
}

impl CheckpointData {
    /// The step output carried by this checkpoint, if it is one.
    pub fn step_output(&self) -> Option<&serde_json::Value> {
        match self {
            Self::StepOutput { output } => Some(output),
            _ => None,
        }
    }

    pub fn sub_task_cursor(&self) -> Option<&SubTaskCursor> {
        match self {
            Self::SubTask(cursor) => Some(cursor),
            _ => None,
        }
    }
}

/// Progress cursor for a step made of many ordered sub-units (e.g. one
/// calendar day of history per unit). Exists only while the owning step is
/// incomplete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTaskCursor {
    /// Identifier of the last sub-unit that completed, if any.
    pub last_completed: Option<String>,
    pub completed_count: u32,
    pub total_count: u32,
}

impl SubTaskCursor {
    pub fn new(total_count: u32) -> Self {
        Self {
            last_completed: None,
            completed_count: 0,
            total_count,
        }
    }

    /// Record one completed sub-unit.
    pub fn advance(&mut self, unit: impl Into<String>) {
        self.last_completed = Some(unit.into());
        self.completed_count += 1;
    }
}

/// Batch-wide progress checkpoint, one per job type, owned entirely by the
/// executor. Business code never reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub processed_count: u32,
    pub total_count: u32,
    pub last_processed_scope_id: Option<String>,
    pub errors: Vec<String>,
    /// Set if and only if processed_count == total_count at save time.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for BatchProgress {
    fn default() -> Self {
        Self::empty()
    }
}

impl BatchProgress {
    pub fn empty() -> Self {
        Self {
            processed_count: 0,
            total_count: 0,
            last_processed_scope_id: None,
            errors: Vec::new(),
            completed_at: None,
        }
    }

    /// Record one handled item. `completed_at` is recomputed on every save,
    /// so it is cleared here and re-stamped by [`Self::stamp_completion`].
    pub fn record_item(&mut self, scope_id: &str) {
        self.processed_count += 1;
        self.last_processed_scope_id = Some(scope_id.to_string());
        self.completed_at = None;
    }

    /// Apply the completion rule: completed_at is set iff counts match.
    pub fn stamp_completion(&mut self, now: DateTime<Utc>) {
        self.completed_at = if self.total_count > 0 && self.processed_count >= self.total_count {
            Some(now)
        } else {
            None
        };
    }

    /// Whether this progress record belongs to a previous trading day.
    ///
    /// These are daily jobs bound to a business calendar: a batch marked
    /// complete yesterday means "everything to do again today", not "nothing
    /// to do". The comparison uses the configured calendar offset.
    pub fn is_stale(&self, now: DateTime<Utc>, calendar_offset: FixedOffset) -> bool {
        match self.completed_at {
            Some(completed_at) => {
                calendar_day(completed_at, calendar_offset) != calendar_day(now, calendar_offset)
            }
            None => false,
        }
    }
}

fn calendar_day(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_scope_sentinel_round_trip() {
        assert_eq!(ScopeId::Global.as_str(), GLOBAL_SCOPE);
        assert_eq!(ScopeId::from_stored(GLOBAL_SCOPE), ScopeId::Global);
        assert_eq!(
            ScopeId::from_stored("abc-123"),
            ScopeId::Item("abc-123".to_string())
        );
    }

    #[test]
    fn test_completion_stamp_only_when_counts_match() {
        let mut progress = BatchProgress::empty();
        progress.total_count = 2;
        progress.record_item("a");
        progress.stamp_completion(Utc::now());
        assert!(progress.completed_at.is_none());

        progress.record_item("b");
        progress.stamp_completion(Utc::now());
        assert!(progress.completed_at.is_some());
    }

    #[test]
    fn test_empty_batch_is_never_stamped_complete() {
        let mut progress = BatchProgress::empty();
        progress.stamp_completion(Utc::now());
        assert!(progress.completed_at.is_none());
    }

    #[test]
    fn test_staleness_uses_calendar_day_in_offset() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let mut progress = BatchProgress::empty();
        progress.total_count = 1;
        progress.processed_count = 1;

        // Completed yesterday (calendar-wise), checked today.
        progress.completed_at = Some(utc(2026, 8, 29, 12));
        assert!(progress.is_stale(utc(2026, 8, 30, 12), offset));

        // Completed "today" in the offset zone even though the UTC dates differ:
        // 03:00 UTC on the 30th is still the evening of the 29th at UTC-5.
        progress.completed_at = Some(utc(2026, 8, 30, 3));
        assert!(!progress.is_stale(utc(2026, 8, 29, 23), offset));
    }

    #[test]
    fn test_sub_task_cursor_advance() {
        let mut cursor = SubTaskCursor::new(3);
        cursor.advance("2026-08-28");
        cursor.advance("2026-08-29");
        assert_eq!(cursor.completed_count, 2);
        assert_eq!(cursor.last_completed.as_deref(), Some("2026-08-29"));
    }
}
