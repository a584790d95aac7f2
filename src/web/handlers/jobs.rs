//! # Job Trigger Handlers
//!
//! `POST /jobs/{job_type}/run` is the scheduler's entry point. The optional
//! `variant` query parameter selects the pooled fan-out executor instead of
//! the sequential one. Responses are HTTP 200 even when items failed
//! internally; `success` and `errors` carry the detail and `has_more`
//! signals whether another invocation is needed.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::constants::JobType;
use crate::engine::{BatchRunReport, EngineError};
use crate::error::BatchError;
use crate::web::errors::ApiError;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    /// `pooled` selects the bounded worker-pool variant.
    pub variant: Option<String>,
}

/// Scheduler-facing run summary.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub success: bool,
    pub processed: u32,
    pub finalized: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    pub duration: String,
    pub has_more: bool,
    pub timestamp: String,
}

impl RunResponse {
    fn from_report(report: BatchRunReport) -> Self {
        Self {
            success: report.errors.is_empty(),
            processed: report.processed,
            finalized: report.finalized,
            errors: if report.errors.is_empty() {
                None
            } else {
                Some(report.errors)
            },
            duration: format!("{:.1}s", report.duration.as_secs_f64()),
            has_more: report.has_more,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    fn from_failure(message: String) -> Self {
        Self {
            success: false,
            processed: 0,
            finalized: 0,
            errors: Some(vec![message]),
            duration: "0.0s".to_string(),
            has_more: true,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Run one invocation: POST /jobs/{job_type}/run
pub async fn run_job(
    State(state): State<AppState>,
    Path(job_type): Path<String>,
    Query(query): Query<RunQuery>,
) -> Result<Json<RunResponse>, ApiError> {
    let job_type: JobType = job_type
        .parse()
        .map_err(|_| ApiError::UnknownJobType(job_type))?;

    let result = match query.variant.as_deref() {
        Some("pooled") => state.worker_pool.run_batch(job_type).await,
        _ => state.executor.run_batch(job_type).await,
    };

    match result {
        Ok(report) => {
            info!(
                job_type = %job_type,
                processed = report.processed,
                finalized = report.finalized,
                has_more = report.has_more,
                "Trigger invocation finished"
            );
            Ok(Json(RunResponse::from_report(report)))
        }
        // A job type that parses but was never registered is a caller error.
        Err(BatchError::Engine(EngineError::UnregisteredJob(_))) => {
            Err(ApiError::UnknownJobType(job_type.to_string()))
        }
        // Batch-level failures still answer 200: the scheduler will come
        // back on its next tick rather than hammering retries.
        Err(batch_error) => {
            error!(job_type = %job_type, error = %batch_error, "Trigger invocation failed");
            Ok(Json(RunResponse::from_failure(batch_error.to_string())))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub success: bool,
    pub reset: u64,
    pub timestamp: String,
}

/// Operator recovery: POST /jobs/{job_type}/reset re-queues failed items.
pub async fn reset_job(
    State(state): State<AppState>,
    Path(job_type): Path<String>,
) -> Result<Json<ResetResponse>, ApiError> {
    let job_type: JobType = job_type
        .parse()
        .map_err(|_| ApiError::UnknownJobType(job_type))?;

    let reset = state.executor.reset_failed(job_type).await?;
    Ok(Json(ResetResponse {
        success: true,
        reset,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Serialize)]
pub struct CompactResponse {
    pub success: bool,
    pub rewritten: u64,
    pub timestamp: String,
}

/// One-off schema bookkeeping: POST /admin/compact_checkpoints
pub async fn compact_checkpoints(
    State(state): State<AppState>,
) -> Result<Json<CompactResponse>, ApiError> {
    let rewritten = state.executor.compact_legacy_checkpoints().await?;
    Ok(Json(CompactResponse {
        success: true,
        rewritten,
        timestamp: Utc::now().to_rfc3339(),
    }))
}
