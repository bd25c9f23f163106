//! Data transfer objects for the broker API

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Response to a successful job submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: Uuid,
}

/// Artifact descriptor, derived from the job's output tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactModel {
    /// Output-relative name, `/`-separated.
    pub name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Artifact listing for a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactList {
    pub job_id: Uuid,
    pub artifacts: Vec<ArtifactModel>,
}

/// Error envelope returned by every failing route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable machine-readable code, e.g. `MIXED_KW_ZIP_LAYOUT`.
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
