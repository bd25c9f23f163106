//! Job domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EffectiveConfig;

/// Job execution record
///
/// Structure shared between the API facade (persists) and the worker pool
/// (updates). Once a job reaches a terminal status no field may change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub progress: JobProgress,
    pub error: Option<JobErrorInfo>,
    /// Durable cooperative-cancellation flag; observed by the owning worker
    /// at analysis checkpoints.
    pub cancel_requested: bool,
    /// Defaults merged with client overrides, frozen at creation.
    pub effective_config: EffectiveConfig,
    pub input_manifest: Vec<InputFile>,
    /// Classified group names, present for Kruskal-Wallis jobs only.
    pub kw_groups: Option<Vec<String>>,
    /// Output-relative path of the result document, set on completion.
    pub result_path: Option<String>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Progress snapshot, written only by the worker owning the job while Running.
/// `percent` never decreases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub percent: f64,
    pub step: String,
    pub message: Option<String>,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self {
            percent: 0.0,
            step: "queued".to_string(),
            message: None,
        }
    }
}

/// Classified error recorded on a job that reached the Failed status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Analysis flavors offered by the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobType {
    BootstrapSingle,
    BootstrapDual,
    KwPermutation,
    DescriptiveOnly,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::BootstrapSingle => "BootstrapSingle",
            JobType::BootstrapDual => "BootstrapDual",
            JobType::KwPermutation => "KwPermutation",
            JobType::DescriptiveOnly => "DescriptiveOnly",
        }
    }

    /// Upload requirements for this job type.
    ///
    /// One variant per input family so that adding a job type means adding a
    /// variant here instead of scattering conditionals through validation.
    pub fn input_spec(&self) -> InputSpec {
        match self {
            JobType::BootstrapSingle | JobType::DescriptiveOnly => InputSpec::SingleCsv {
                second_optional: true,
            },
            JobType::BootstrapDual => InputSpec::DualCsv,
            JobType::KwPermutation => InputSpec::Archive,
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BootstrapSingle" => Ok(JobType::BootstrapSingle),
            "BootstrapDual" => Ok(JobType::BootstrapDual),
            "KwPermutation" => Ok(JobType::KwPermutation),
            "DescriptiveOnly" => Ok(JobType::DescriptiveOnly),
            other => Err(format!("unknown job type: {}", other)),
        }
    }
}

/// Upload requirements, one variant per job type family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSpec {
    /// One CSV required; a second one may be supplied for context.
    SingleCsv { second_optional: bool },
    /// Exactly two CSVs.
    DualCsv,
    /// One ZIP bundle, classified into groups.
    Archive,
}

/// Role an uploaded file plays in a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputRole {
    Primary,
    Secondary,
    Bundle,
}

/// Input descriptor persisted in the job manifest at creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFile {
    pub name: String,
    pub size_bytes: u64,
    pub role: InputRole,
}
