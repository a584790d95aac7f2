//! # Work Item Model
//!
//! A unit of batch work created by an upstream business trigger (an index to
//! rebalance, a report to generate, a flag to reevaluate). Items move through
//! `pending → processing → completed | failed`; the step cursor itself is
//! derived from which checkpoints exist, not stored on the item.
//!
//! ## Database Schema
//!
//! Maps to the `alpharank_work_items` table:
//! ```sql
//! CREATE TABLE alpharank_work_items (
//!   item_id UUID PRIMARY KEY,
//!   job_type VARCHAR NOT NULL,
//!   target_id VARCHAR NOT NULL,
//!   priority VARCHAR NOT NULL,
//!   payload JSONB NOT NULL,
//!   status VARCHAR NOT NULL,
//!   error_message VARCHAR,
//!   created_at TIMESTAMPTZ NOT NULL,
//!   last_processed_at TIMESTAMPTZ
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{JobType, PriorityClass};
use crate::state_machine::WorkItemStatus;

/// A queued unit of batch work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub item_id: Uuid,
    pub job_type: JobType,
    /// Identifier of the business entity this item targets (ticker, index id).
    /// Used for duplicate-pipeline exclusion in the work selector.
    pub target_id: String,
    pub priority: PriorityClass,
    /// Opaque trigger context passed through to step handlers.
    pub payload: serde_json::Value,
    pub status: WorkItemStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_processed_at: Option<DateTime<Utc>>,
}

/// New work item for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkItem {
    pub job_type: JobType,
    pub target_id: String,
    pub priority: PriorityClass,
    pub payload: serde_json::Value,
}

impl WorkItem {
    /// Build a fresh pending item from a creation request.
    pub fn from_new(new_item: NewWorkItem, now: DateTime<Utc>) -> Self {
        Self {
            item_id: Uuid::new_v4(),
            job_type: new_item.job_type,
            target_id: new_item.target_id,
            priority: new_item.priority,
            payload: new_item.payload,
            status: WorkItemStatus::Pending,
            error_message: None,
            created_at: now,
            last_processed_at: None,
        }
    }

    /// Whether this item still occupies a queue slot for its target.
    pub fn is_in_flight(&self) -> bool {
        !self.status.is_terminal()
    }
}
