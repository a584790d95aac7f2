//! # API Error Types
//!
//! Error surface for the trigger endpoints. Kept deliberately small: the
//! scheduler is the only client, and processing failures travel inside the
//! 200 response body rather than as HTTP errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::UnknownJobType(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<crate::error::BatchError> for ApiError {
    fn from(error: crate::error::BatchError) -> Self {
        ApiError::Internal(error.to_string())
    }
}
