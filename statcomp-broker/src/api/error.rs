//! API Error Handling
//!
//! Every failing route answers with the same envelope:
//! `{"error": {"code", "message", "details"}}` — a stable machine-readable
//! code, a human message, and structured details a client can act on.
//! Internal errors are logged and answered generically; messages never carry
//! filesystem paths.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use statcomp_core::dto::{ErrorBody, ErrorDetail};

use crate::service::job::JobError;

/// API error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "internal server error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("API error {}: {}", self.code, self.message);
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<JobError> for ApiError {
    fn from(error: JobError) -> Self {
        match error {
            JobError::NotFound(id) => Self::not_found(format!("job {} not found", id)),
            JobError::ArtifactNotFound(name) => {
                Self::not_found(format!("artifact {} not found", name))
            }
            JobError::NotReady(id) => Self::new(
                StatusCode::CONFLICT,
                "NOT_READY",
                format!("job {} is not completed", id),
            ),
            JobError::AlreadyTerminal { id, status } => Self::new(
                StatusCode::CONFLICT,
                "CONFLICT",
                format!("job {} is already {:?}", id, status),
            ),
            JobError::Validation {
                code,
                message,
                details,
            } => {
                let status = if code == "PAYLOAD_TOO_LARGE" {
                    StatusCode::PAYLOAD_TOO_LARGE
                } else {
                    StatusCode::BAD_REQUEST
                };
                Self {
                    status,
                    code: code.to_string(),
                    message,
                    details,
                }
            }
            JobError::QueueFull => Self::new(
                StatusCode::TOO_MANY_REQUESTS,
                "QUEUE_FULL",
                "job queue is full, retry later",
            ),
            JobError::Database(db_error) => {
                tracing::error!("database error: {:?}", db_error);
                Self::internal()
            }
            JobError::Storage(io_error) => {
                tracing::error!("storage error: {:?}", io_error);
                Self::internal()
            }
            JobError::Serialize(serde_error) => {
                tracing::error!("serialization error: {:?}", serde_error);
                Self::internal()
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
