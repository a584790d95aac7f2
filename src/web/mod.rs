//! # HTTP Trigger Surface
//!
//! One endpoint per job type, invoked by the external scheduler on a fixed
//! cadence. Requests authenticate with a shared secret; responses are HTTP
//! 200 even on partial internal failure so the scheduler never enters a
//! retry storm — `has_more` tells it whether another tick is needed.

pub mod auth;
pub mod errors;
pub mod handlers;
pub mod state;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use errors::ApiError;
pub use state::AppState;

/// Build the trigger router. `/health` and `/ready` are unauthenticated for
/// load balancers; everything else requires the scheduler secret.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/jobs/:job_type/run", post(handlers::jobs::run_job))
        .route("/jobs/:job_type/reset", post(handlers::jobs::reset_job))
        .route(
            "/admin/compact_checkpoints",
            post(handlers::jobs::compact_checkpoints),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_scheduler_secret,
        ));

    Router::new()
        .merge(protected)
        .route("/health", get(handlers::health::basic_health))
        .route("/ready", get(handlers::health::readiness_probe))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the trigger router until the process is stopped.
pub async fn serve(state: AppState, bind_address: &str) -> crate::error::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .map_err(|e| crate::error::BatchError::Configuration(format!("bind failed: {e}")))?;
    info!(address = %bind_address, "Trigger surface listening");
    axum::serve(listener, router)
        .await
        .map_err(|e| crate::error::BatchError::Configuration(format!("server error: {e}")))?;
    Ok(())
}
