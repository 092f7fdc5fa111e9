//! API error types with HTTP status mapping.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                "request body exceeds the configured limit".to_string(),
            ),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "an internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<sentinel_persist::StorageError> for ApiError {
    fn from(e: sentinel_persist::StorageError) -> Self {
        match e {
            sentinel_persist::StorageError::NotFound(msg) => ApiError::NotFound(msg),
            sentinel_persist::StorageError::AlreadyExists(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<sentinel_persist::TransitionError> for ApiError {
    fn from(e: sentinel_persist::TransitionError) -> Self {
        match e {
            sentinel_persist::TransitionError::NotFound(id) => {
                ApiError::NotFound(format!("incident {id} not found"))
            }
            sentinel_persist::TransitionError::Invalid { from, to } => {
                ApiError::Conflict(format!("cannot transition {from} -> {to}"))
            }
            sentinel_persist::TransitionError::Storage(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_found_maps_to_404() {
        let response = ApiError::NotFound("incident".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
