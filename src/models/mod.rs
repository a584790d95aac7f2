//! # Data Layer
//!
//! Core persisted entities for the batch engine: work items queued by business
//! triggers, and the durable checkpoints that make multi-invocation progress
//! possible.

pub mod checkpoint;
pub mod work_item;

pub use checkpoint::{BatchProgress, Checkpoint, CheckpointData, ScopeId, SubTaskCursor};
pub use work_item::{NewWorkItem, WorkItem};
