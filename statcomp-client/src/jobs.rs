//! Job-related API endpoints

use reqwest::multipart::{Form, Part};
use uuid::Uuid;

use statcomp_core::config::{ConfigOverrides, EffectiveConfig};
use statcomp_core::domain::job::{Job, JobType};
use statcomp_core::dto::{ArtifactList, CreateJobResponse};

use crate::BrokerClient;
use crate::error::{ClientError, Result};

/// Uploads attached to a submission: `(file name, bytes)` per slot
#[derive(Debug, Default)]
pub struct SubmitFiles {
    pub file1: Option<(String, Vec<u8>)>,
    pub file2: Option<(String, Vec<u8>)>,
    pub kw_bundle: Option<(String, Vec<u8>)>,
}

impl BrokerClient {
    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Submit a new analysis job
    ///
    /// # Arguments
    /// * `job_type` - The analysis flavor to run
    /// * `overrides` - Configuration overrides merged over the broker defaults
    /// * `files` - The uploads the job type requires
    ///
    /// # Returns
    /// The created job's id; poll [`BrokerClient::get_job`] for progress.
    pub async fn submit_job(
        &self,
        job_type: JobType,
        overrides: &ConfigOverrides,
        files: SubmitFiles,
    ) -> Result<CreateJobResponse> {
        let config_json = serde_json::to_string(overrides)
            .map_err(|error| ClientError::ParseError(error.to_string()))?;

        let mut form = Form::new()
            .text("job_type", job_type.as_str())
            .text("config", config_json);
        for (field, payload) in [
            ("file1", files.file1),
            ("file2", files.file2),
            ("kw_bundle", files.kw_bundle),
        ] {
            if let Some((file_name, bytes)) = payload {
                form = form.part(field, Part::bytes(bytes).file_name(file_name));
            }
        }

        let url = format!("{}/jobs", self.base_url);
        let response = self.client.post(&url).multipart(form).send().await?;

        self.handle_response(response).await
    }

    /// Get a job snapshot by ID
    pub async fn get_job(&self, job_id: Uuid) -> Result<Job> {
        let url = format!("{}/jobs/{}", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Request cancellation of a job
    ///
    /// Returns the snapshot taken right after the request was accepted; a
    /// running job converges to Cancelled at its next checkpoint.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<Job> {
        let url = format!("{}/jobs/{}/cancel", self.base_url, job_id);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Fetch the normalized result document of a completed job
    pub async fn get_results(&self, job_id: Uuid) -> Result<serde_json::Value> {
        let url = format!("{}/jobs/{}/results", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List the artifacts written for a job so far
    pub async fn list_artifacts(&self, job_id: Uuid) -> Result<ArtifactList> {
        let url = format!("{}/jobs/{}/artifacts", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Download one artifact's bytes
    pub async fn download_artifact(&self, job_id: Uuid, name: &str) -> Result<Vec<u8>> {
        let url = format!("{}/jobs/{}/artifacts/{}", self.base_url, job_id, name);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.error_from(status, response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Fetch the analysis defaults a submission starts from
    pub async fn config_defaults(&self) -> Result<EffectiveConfig> {
        let url = format!("{}/config/defaults", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
