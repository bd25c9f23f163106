//! Error types for the statcomp client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the statcomp client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The broker answered with its structured error envelope
    #[error("API error {code} (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Stable machine-readable code from the envelope
        code: String,
        /// Error message from the broker
        message: String,
    },

    /// Failed to parse a response body
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl ClientError {
    /// Create an API error from status code, error code and message
    pub fn api_error(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let error = ClientError::api_error(409, "NOT_READY", "job is not completed");
        assert_eq!(
            error.to_string(),
            "API error NOT_READY (status 409): job is not completed"
        );
        assert!(!error.is_not_found());
        assert!(ClientError::api_error(404, "NOT_FOUND", "gone").is_not_found());
    }
}
