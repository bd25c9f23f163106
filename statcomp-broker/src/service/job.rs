//! Job Service
//!
//! Coordinates request validation, bundle classification, job-scoped storage
//! and queue submission for the API endpoints. Validation and classification
//! failures are returned synchronously and prevent job creation entirely;
//! once a job row exists, all later failures are recorded on the job and
//! observed via polling.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use statcomp_core::classify::{ClassifyError, classify_entries};
use statcomp_core::config::{ConfigOverrides, EffectiveConfig};
use statcomp_core::domain::group::GroupSet;
use statcomp_core::domain::job::{
    InputFile, InputRole, InputSpec, Job, JobProgress, JobStatus, JobType,
};
use statcomp_core::dto::ArtifactModel;
use statcomp_engine::ingest::validate_csv;
use statcomp_engine::report::RESULTS_FILE;

use crate::repository::job_repository;
use crate::service::bundle;
use crate::state::AppState;
use crate::storage::{self, JobPaths};

const BUNDLE_FILE: &str = "kw_bundle.zip";

/// Service error type
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(Uuid),
    #[error("artifact {0} not found")]
    ArtifactNotFound(String),
    #[error("job {0} is not completed")]
    NotReady(Uuid),
    #[error("job {id} is already {status:?}")]
    AlreadyTerminal { id: Uuid, status: JobStatus },
    #[error("{message}")]
    Validation {
        code: &'static str,
        message: String,
        details: Option<serde_json::Value>,
    },
    #[error("job queue is full, retry later")]
    QueueFull,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl JobError {
    fn validation(code: &'static str, message: impl Into<String>) -> Self {
        JobError::Validation {
            code,
            message: message.into(),
            details: None,
        }
    }

    fn validation_with(
        code: &'static str,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        JobError::Validation {
            code,
            message: message.into(),
            details: Some(details),
        }
    }
}

impl From<ClassifyError> for JobError {
    fn from(error: ClassifyError) -> Self {
        JobError::Validation {
            code: error.code(),
            message: error.to_string(),
            details: None,
        }
    }
}

/// Uploaded payloads for a submission, keyed by multipart field
#[derive(Debug, Default)]
pub struct NewJobFiles {
    pub file1: Option<Vec<u8>>,
    pub file2: Option<Vec<u8>>,
    pub kw_bundle: Option<Vec<u8>>,
}

/// Create and enqueue a new job.
///
/// Returns immediately after the Queued row is persisted; computation never
/// runs on the request path.
pub async fn create_job(
    state: &AppState,
    job_type: JobType,
    overrides: ConfigOverrides,
    files: NewJobFiles,
) -> Result<Job, JobError> {
    let config = EffectiveConfig::merged(&overrides);
    config
        .validate()
        .map_err(|message| JobError::validation("INVALID_CONFIG", message))?;
    check_required_files(job_type, &files)?;
    check_size_limits(state, &files)?;

    // Admission control at the submission boundary; distinct from the worker
    // pool's own concurrency limit, which just leaves jobs queued.
    let queued = job_repository::count_queued(&state.pool).await?;
    if queued >= state.config.max_queue_depth {
        return Err(JobError::QueueFull);
    }

    let job_id = Uuid::new_v4();
    let paths = storage::prepare_job_paths(&state.config.storage_root, job_id)?;

    let staged = stage_inputs(&paths, job_type, &config, &files);
    let job = match staged {
        Ok((input_manifest, kw_groups)) => Job {
            id: job_id,
            job_type,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            progress: JobProgress::default(),
            error: None,
            cancel_requested: false,
            effective_config: config,
            input_manifest,
            kw_groups,
            result_path: None,
        },
        Err(error) => {
            storage::cleanup_job(&paths);
            return Err(error);
        }
    };

    if let Err(error) = job_repository::insert(&state.pool, &job).await {
        storage::cleanup_job(&paths);
        return Err(error.into());
    }

    state.queue.notify_one();
    tracing::info!("job {} created ({})", job.id, job.job_type.as_str());
    Ok(job)
}

/// Get a job snapshot by ID
pub async fn get_job(state: &AppState, id: Uuid) -> Result<Job, JobError> {
    job_repository::find_by_id(&state.pool, id)
        .await?
        .ok_or(JobError::NotFound(id))
}

/// Request cancellation of a job.
///
/// Queued jobs are removed from the queue and cancelled immediately. Running
/// jobs get their cancellation flag set and converge to Cancelled at the
/// worker's next checkpoint; the call does not wait for that.
pub async fn cancel_job(state: &AppState, id: Uuid) -> Result<Job, JobError> {
    let job = get_job(state, id).await?;
    if job.status.is_terminal() {
        return Err(JobError::AlreadyTerminal {
            id,
            status: job.status,
        });
    }

    if job.status == JobStatus::Queued
        && job_repository::cancel_if_queued(&state.pool, id, Utc::now()).await?
    {
        storage::cleanup_job(&storage::job_paths(&state.config.storage_root, id));
        tracing::info!("job {} cancelled while queued", id);
        return get_job(state, id).await;
    }

    // Claimed by a worker in the meantime; degrade to the cooperative path.
    let flagged = job_repository::request_cancel(&state.pool, id).await?;
    if !flagged {
        let current = get_job(state, id).await?;
        return Err(JobError::AlreadyTerminal {
            id,
            status: current.status,
        });
    }
    state.cancel.request(id);
    tracing::info!("cancellation requested for job {}", id);
    get_job(state, id).await
}

/// Normalized result document of a completed job.
pub async fn get_results(state: &AppState, id: Uuid) -> Result<serde_json::Value, JobError> {
    let job = get_job(state, id).await?;
    if job.status != JobStatus::Completed {
        return Err(JobError::NotReady(id));
    }

    let paths = storage::job_paths(&state.config.storage_root, id);
    let result_name = job.result_path.as_deref().unwrap_or(RESULTS_FILE);
    let result_path = storage::safe_join(&paths.output_dir, result_name)
        .ok_or_else(|| JobError::ArtifactNotFound(result_name.to_string()))?;
    let content = fs::read_to_string(&result_path)
        .map_err(|_| JobError::ArtifactNotFound(result_name.to_string()))?;
    Ok(serde_json::from_str(&content)?)
}

/// List the artifacts written so far for a job.
///
/// Available before the terminal state too; artifacts appear as the engine
/// writes them.
pub async fn list_artifacts(state: &AppState, id: Uuid) -> Result<Vec<ArtifactModel>, JobError> {
    get_job(state, id).await?;

    let paths = storage::job_paths(&state.config.storage_root, id);
    if !paths.output_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut artifacts = Vec::new();
    collect_artifacts(&paths.output_dir, &paths.output_dir, &mut artifacts)?;
    artifacts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(artifacts)
}

/// Resolve an artifact name to its on-disk path, traversal-safe.
pub async fn artifact_path(state: &AppState, id: Uuid, name: &str) -> Result<PathBuf, JobError> {
    get_job(state, id).await?;

    let paths = storage::job_paths(&state.config.storage_root, id);
    let target = storage::safe_join(&paths.output_dir, name)
        .ok_or_else(|| JobError::ArtifactNotFound(name.to_string()))?;
    if !target.is_file() {
        return Err(JobError::ArtifactNotFound(name.to_string()));
    }
    Ok(target)
}

/// Content type for an artifact name, by extension.
pub fn content_type_for(name: &str) -> &'static str {
    match name.rsplit('.').next() {
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        Some("txt") | Some("log") => "text/plain",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

// =============================================================================
// Submission validation and staging
// =============================================================================

fn check_required_files(job_type: JobType, files: &NewJobFiles) -> Result<(), JobError> {
    match job_type.input_spec() {
        InputSpec::SingleCsv { second_optional } => {
            if files.file1.is_none() {
                return Err(JobError::validation(
                    "MISSING_FILE",
                    "file1 is required for the selected job type",
                ));
            }
            if !second_optional && files.file2.is_some() {
                return Err(JobError::validation(
                    "INVALID_FILE",
                    "file2 is not accepted for the selected job type",
                ));
            }
            if files.kw_bundle.is_some() {
                return Err(JobError::validation(
                    "INVALID_FILE",
                    "kw_bundle is only valid for KwPermutation",
                ));
            }
        }
        InputSpec::DualCsv => {
            if files.file1.is_none() || files.file2.is_none() {
                return Err(JobError::validation(
                    "MISSING_FILE",
                    "file1 and file2 are required for BootstrapDual",
                ));
            }
            if files.kw_bundle.is_some() {
                return Err(JobError::validation(
                    "INVALID_FILE",
                    "kw_bundle is only valid for KwPermutation",
                ));
            }
        }
        InputSpec::Archive => {
            if files.kw_bundle.is_none() {
                return Err(JobError::validation(
                    "MISSING_FILE",
                    "kw_bundle is required for KwPermutation",
                ));
            }
            if files.file1.is_some() || files.file2.is_some() {
                return Err(JobError::validation(
                    "INVALID_FILE",
                    "file1/file2 are not accepted for KwPermutation",
                ));
            }
        }
    }
    Ok(())
}

fn check_size_limits(state: &AppState, files: &NewJobFiles) -> Result<(), JobError> {
    let limit = state.config.max_upload_bytes();
    for (field, payload) in [
        ("file1", &files.file1),
        ("file2", &files.file2),
        ("kw_bundle", &files.kw_bundle),
    ] {
        if let Some(bytes) = payload {
            if bytes.len() > limit {
                return Err(JobError::validation_with(
                    "PAYLOAD_TOO_LARGE",
                    format!(
                        "{} exceeds the {} MB upload limit",
                        field, state.config.max_upload_mb
                    ),
                    serde_json::json!({ "field": field, "sizeBytes": bytes.len() }),
                ));
            }
        }
    }
    Ok(())
}

/// Persist the frozen config and the validated inputs into the job's input
/// area, returning the manifest and (for KW jobs) the classified group names.
fn stage_inputs(
    paths: &JobPaths,
    job_type: JobType,
    config: &EffectiveConfig,
    files: &NewJobFiles,
) -> Result<(Vec<InputFile>, Option<Vec<String>>), JobError> {
    fs::write(
        paths.input_dir.join("config.json"),
        serde_json::to_vec_pretty(config)?,
    )?;

    let mut manifest = Vec::new();
    let mut kw_groups = None;

    if job_type.input_spec() == InputSpec::Archive {
        let bundle_bytes = files.kw_bundle.as_deref().unwrap_or_default();
        let group_set = classify_bundle(bundle_bytes)?;
        extract_bundle(paths, bundle_bytes, &group_set)?;
        fs::write(paths.input_dir.join(BUNDLE_FILE), bundle_bytes)?;
        manifest.push(InputFile {
            name: BUNDLE_FILE.to_string(),
            size_bytes: bundle_bytes.len() as u64,
            role: InputRole::Bundle,
        });
        kw_groups = Some(group_set.names());
    } else {
        for (field, payload, role) in [
            ("file1", &files.file1, InputRole::Primary),
            ("file2", &files.file2, InputRole::Secondary),
        ] {
            let Some(bytes) = payload else { continue };
            validate_csv(bytes).map_err(|error| {
                JobError::validation_with(
                    "INVALID_CSV",
                    format!("{} is not a usable numeric CSV: {}", field, error),
                    serde_json::json!({ "file": field }),
                )
            })?;
            let name = format!("{}.csv", field);
            fs::write(paths.input_dir.join(&name), bytes)?;
            manifest.push(InputFile {
                name,
                size_bytes: bytes.len() as u64,
                role,
            });
        }
    }

    Ok((manifest, kw_groups))
}

fn classify_bundle(bundle_bytes: &[u8]) -> Result<GroupSet, JobError> {
    let entries = bundle::read_entries(bundle_bytes).map_err(|_| {
        JobError::validation("INVALID_ZIP", "kw_bundle must be a valid ZIP archive")
    })?;
    Ok(classify_entries(&entries)?)
}

/// Extract each classified CSV into `input/<group>/<file>`, validating that
/// every member parses as a numeric CSV.
fn extract_bundle(
    paths: &JobPaths,
    bundle_bytes: &[u8],
    group_set: &GroupSet,
) -> Result<(), JobError> {
    for group in &group_set.groups {
        let group_dir = paths.input_dir.join(&group.name);
        fs::create_dir_all(&group_dir)?;
        for entry_path in &group.files {
            let entry_bytes = bundle::read_entry_bytes(bundle_bytes, entry_path).map_err(|_| {
                JobError::validation("INVALID_ZIP", "kw_bundle must be a valid ZIP archive")
            })?;
            validate_csv(&entry_bytes).map_err(|error| {
                JobError::validation_with(
                    "INVALID_CSV",
                    format!("{} is not a usable numeric CSV: {}", entry_path, error),
                    serde_json::json!({ "file": entry_path }),
                )
            })?;
            let file_name = entry_path.rsplit('/').next().unwrap_or(entry_path);
            let target = storage::safe_join(&group_dir, file_name)
                .ok_or_else(|| JobError::validation("INVALID_FILE", "unsafe bundle entry name"))?;
            fs::write(target, &entry_bytes)?;
        }
    }
    Ok(())
}

fn collect_artifacts(
    base: &Path,
    dir: &Path,
    artifacts: &mut Vec<ArtifactModel>,
) -> Result<(), std::io::Error> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_artifacts(base, &path, artifacts)?;
            continue;
        }
        let metadata = entry.metadata()?;
        let name = path
            .strip_prefix(base)
            .unwrap_or(&path)
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let created_at = metadata
            .modified()
            .map(chrono::DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        artifacts.push(ArtifactModel {
            content_type: content_type_for(&name).to_string(),
            name,
            size_bytes: metadata.len(),
            created_at,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_files_per_job_type() {
        let with_file1 = NewJobFiles {
            file1: Some(vec![b'1']),
            ..Default::default()
        };
        assert!(check_required_files(JobType::BootstrapSingle, &with_file1).is_ok());
        assert!(check_required_files(JobType::BootstrapDual, &with_file1).is_err());
        assert!(check_required_files(JobType::KwPermutation, &with_file1).is_err());

        let with_bundle = NewJobFiles {
            kw_bundle: Some(vec![b'z']),
            ..Default::default()
        };
        assert!(check_required_files(JobType::KwPermutation, &with_bundle).is_ok());
        let err = check_required_files(JobType::BootstrapSingle, &with_bundle).unwrap_err();
        assert!(matches!(
            err,
            JobError::Validation {
                code: "MISSING_FILE",
                ..
            }
        ));
    }

    #[test]
    fn test_bundle_alongside_plain_file_rejected() {
        let files = NewJobFiles {
            file1: Some(vec![b'1']),
            kw_bundle: Some(vec![b'z']),
            ..Default::default()
        };
        let err = check_required_files(JobType::BootstrapSingle, &files).unwrap_err();
        assert!(matches!(
            err,
            JobError::Validation {
                code: "INVALID_FILE",
                ..
            }
        ));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("results.json"), "application/json");
        assert_eq!(content_type_for("plots/file1_histogram.csv"), "text/csv");
        assert_eq!(content_type_for("mystery.bin"), "application/octet-stream");
    }
}
