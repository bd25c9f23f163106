//! Statcomp HTTP Client
//!
//! A simple, type-safe HTTP client for the statcomp broker API.
//!
//! This crate provides a unified interface for CLI and other consumers to
//! submit analysis jobs, poll their lifecycle and fetch results/artifacts.
//!
//! # Example
//!
//! ```no_run
//! use statcomp_client::{BrokerClient, SubmitFiles};
//! use statcomp_core::config::ConfigOverrides;
//! use statcomp_core::domain::job::JobType;
//!
//! # async fn example() -> statcomp_client::Result<()> {
//! let client = BrokerClient::new("http://localhost:8080");
//! let created = client
//!     .submit_job(
//!         JobType::BootstrapSingle,
//!         &ConfigOverrides::default(),
//!         SubmitFiles {
//!             file1: Some(("data.csv".to_string(), b"1\n2\n3\n".to_vec())),
//!             ..Default::default()
//!         },
//!     )
//!     .await?;
//! println!("submitted job {}", created.job_id);
//! # Ok(())
//! # }
//! ```

pub mod error;
mod jobs;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use jobs::SubmitFiles;

use reqwest::Client;
use serde::de::DeserializeOwned;

use statcomp_core::dto::ErrorBody;

/// HTTP client for the statcomp broker API
///
/// Provides methods for the whole job lifecycle: submission, status polling,
/// results, artifact listing/download and cancellation.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    /// Base URL of the broker (e.g. "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl BrokerClient {
    /// Create a new broker client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the broker API (e.g. "http://localhost:8080")
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: Client::new(),
        }
    }

    /// Deserialize a success body, or convert the broker's error envelope
    /// into a [`ClientError`].
    pub(crate) async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|error| ClientError::ParseError(error.to_string()));
        }
        Err(self.error_from(status, response).await)
    }

    pub(crate) async fn error_from(
        &self,
        status: reqwest::StatusCode,
        response: reqwest::Response,
    ) -> ClientError {
        match response.json::<ErrorBody>().await {
            Ok(body) => ClientError::api_error(status.as_u16(), body.error.code, body.error.message),
            Err(_) => ClientError::api_error(status.as_u16(), "HTTP_ERROR", status.to_string()),
        }
    }
}
