//! # Health Endpoints
//!
//! Unauthenticated probes. `/health` is a liveness check that always
//! answers; `/ready` additionally verifies database connectivity when a
//! pool is attached.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

/// Liveness: GET /health
pub async fn basic_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness: GET /ready
///
/// Pings the database when a pool is configured; in-memory deployments
/// are always ready.
pub async fn readiness_probe(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    if let Some(pool) = &state.db_pool {
        if let Err(error) = sqlx::query("SELECT 1").execute(pool).await {
            warn!(error = %error, "Readiness probe failed database ping");
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    Ok(Json(HealthResponse {
        status: "ready".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}
