//! Job API Handlers
//!
//! HTTP endpoints for the job lifecycle: multipart submission, status
//! polling, results, artifact listing/download and cancellation.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use statcomp_core::config::ConfigOverrides;
use statcomp_core::domain::job::{Job, JobType};
use statcomp_core::dto::{ArtifactList, CreateJobResponse};

use crate::api::error::{ApiError, ApiResult};
use crate::service::job::NewJobFiles;
use crate::service::job_service;
use crate::state::AppState;

/// POST /jobs
/// Create and enqueue a new analysis job from a multipart form:
/// `job_type` (text), `config` (JSON text, optional), and the uploads the
/// job type requires (`file1`, `file2`, `kw_bundle`). Returns the job id
/// immediately; computation happens off the request path.
pub async fn create_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<CreateJobResponse>)> {
    let mut job_type: Option<JobType> = None;
    let mut overrides = ConfigOverrides::default();
    let mut files = NewJobFiles::default();

    while let Some(field) = multipart.next_field().await.map_err(|error| {
        ApiError::bad_request(
            "INVALID_REQUEST",
            format!("malformed multipart request: {}", error),
        )
    })? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "job_type" => {
                let text = read_text(field).await?;
                job_type = Some(
                    text.parse()
                        .map_err(|message: String| ApiError::bad_request("INVALID_JOB_TYPE", message))?,
                );
            }
            "config" => {
                let text = read_text(field).await?;
                overrides = serde_json::from_str(&text).map_err(|error| {
                    ApiError::bad_request("INVALID_CONFIG", format!("config JSON is invalid: {}", error))
                })?;
            }
            "file1" => files.file1 = Some(read_bytes(field).await?),
            "file2" => files.file2 = Some(read_bytes(field).await?),
            "kw_bundle" => files.kw_bundle = Some(read_bytes(field).await?),
            other => {
                return Err(ApiError::bad_request(
                    "INVALID_FILE",
                    format!("unexpected form field: {}", other),
                ));
            }
        }
    }

    let job_type = job_type
        .ok_or_else(|| ApiError::bad_request("INVALID_JOB_TYPE", "job_type field is required"))?;

    let job = job_service::create_job(&state, job_type, overrides, files).await?;
    Ok((StatusCode::CREATED, Json(CreateJobResponse { job_id: job.id })))
}

/// GET /jobs/{id}
/// Current snapshot of a job: status, progress, error when failed.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    let job = job_service::get_job(&state, id).await?;
    Ok(Json(job))
}

/// POST /jobs/{id}/cancel
/// Accepted semantics: queued jobs cancel immediately, running jobs converge
/// at the worker's next checkpoint. Terminal jobs answer 409.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let job = job_service::cancel_job(&state, id).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /jobs/{id}/results
/// Normalized result document; 409 NOT_READY until the job completed.
pub async fn get_results(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let results = job_service::get_results(&state, id).await?;
    Ok(Json(results))
}

/// GET /jobs/{id}/artifacts
/// Artifacts written so far (opportunistically available before completion).
pub async fn list_artifacts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ArtifactList>> {
    let artifacts = job_service::list_artifacts(&state, id).await?;
    Ok(Json(ArtifactList {
        job_id: id,
        artifacts,
    }))
}

/// GET /jobs/{id}/artifacts/{name}
/// Stream one artifact's bytes with its content type.
pub async fn download_artifact(
    State(state): State<AppState>,
    Path((id, name)): Path<(Uuid, String)>,
) -> ApiResult<Response> {
    let path = job_service::artifact_path(&state, id, &name).await?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::not_found(format!("artifact {} not found", name)))?;
    let content_type = job_service::content_type_for(&name);
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field.text().await.map_err(|error| {
        ApiError::bad_request("INVALID_REQUEST", format!("unreadable form field: {}", error))
    })
}

async fn read_bytes(field: axum::extract::multipart::Field<'_>) -> ApiResult<Vec<u8>> {
    Ok(field
        .bytes()
        .await
        .map_err(|error| {
            ApiError::bad_request("INVALID_REQUEST", format!("unreadable upload: {}", error))
        })?
        .to_vec())
}
