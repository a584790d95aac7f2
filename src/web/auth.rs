//! # Scheduler Authentication
//!
//! Shared-secret authentication for the trigger endpoints. The external
//! scheduler presents the secret either as a bearer token or via the
//! dedicated `X-Scheduler-Secret` header; absence or mismatch yields 401.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::web::errors::ApiError;
use crate::web::state::AppState;

/// Dedicated secret header, for schedulers that cannot set Authorization.
pub const SCHEDULER_SECRET_HEADER: &str = "x-scheduler-secret";

/// Middleware guarding the trigger endpoints.
///
/// An empty configured secret rejects everything: endpoints are locked
/// until the deployment is configured, never open by accident.
pub async fn require_scheduler_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = state.config.auth.scheduler_secret.as_str();
    if expected.is_empty() {
        warn!("Scheduler secret not configured; rejecting trigger request");
        return Err(ApiError::Unauthorized);
    }

    let presented = bearer_token(&request).or_else(|| secret_header(&request));
    match presented {
        Some(secret) if secret == expected => Ok(next.run(request).await),
        Some(_) => {
            warn!(path = %request.uri().path(), "Scheduler secret mismatch");
            Err(ApiError::Unauthorized)
        }
        None => Err(ApiError::Unauthorized),
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn secret_header(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(SCHEDULER_SECRET_HEADER)?
        .to_str()
        .ok()
}
