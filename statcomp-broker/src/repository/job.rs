//! Job Repository
//!
//! Handles all database operations related to jobs. The Queued rows form the
//! durable work queue; the two contested transitions (the Queued→Running
//! claim and cancellation) are single-statement compare-and-set updates
//! guarded on the current status, which is what makes at-least-once queue
//! delivery behave as effectively-once processing.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use statcomp_core::config::EffectiveConfig;
use statcomp_core::domain::job::{Job, JobErrorInfo, JobProgress, JobStatus};

const JOB_COLUMNS: &str = r#"
    id, job_type, status, created_at, started_at, finished_at,
    progress_percent, progress_step, progress_message,
    error_code, error_message, error_details, cancel_requested,
    effective_config, input_manifest, kw_groups, result_path
"#;

/// Insert a freshly created job in the Queued state.
pub async fn insert(pool: &SqlitePool, job: &Job) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO jobs (
            id, job_type, status, created_at,
            progress_percent, progress_step, cancel_requested,
            effective_config, input_manifest, kw_groups
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(job.id.to_string())
    .bind(job.job_type.as_str())
    .bind(status_to_string(job.status))
    .bind(job.created_at)
    .bind(job.progress.percent)
    .bind(&job.progress.step)
    .bind(job.cancel_requested)
    .bind(to_json(&job.effective_config)?)
    .bind(to_json(&job.input_manifest)?)
    .bind(match &job.kw_groups {
        Some(groups) => Some(to_json(groups)?),
        None => None,
    })
    .execute(pool)
    .await?;

    Ok(())
}

/// Find a job by ID
pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Job::from))
}

/// Number of jobs currently waiting in the queue
pub async fn count_queued(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = 'Queued'")
        .fetch_one(pool)
        .await
}

/// Claim the oldest Queued job: Queued → Running with `started_at` set.
///
/// At most one caller wins a given job; everyone else sees it already
/// Running and moves on to the next row.
pub async fn claim_next_queued(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        r#"
        UPDATE jobs
        SET status = 'Running', started_at = ?1, progress_step = 'starting'
        WHERE id = (
            SELECT id FROM jobs
            WHERE status = 'Queued'
            ORDER BY created_at ASC, id ASC
            LIMIT 1
        )
        AND status = 'Queued'
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(now)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Job::from))
}

/// Set the durable cancellation flag; fails once the job is terminal.
pub async fn request_cancel(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE jobs SET cancel_requested = 1 WHERE id = ?1 AND status IN ('Queued', 'Running')",
    )
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Queued → Cancelled, the facade-side cancellation path. Returns false when
/// the race against a worker claim was lost.
pub async fn cancel_if_queued(
    pool: &SqlitePool,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'Cancelled', finished_at = ?1, cancel_requested = 1
        WHERE id = ?2 AND status = 'Queued'
        "#,
    )
    .bind(now)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Running → Cancelled, performed by the owning worker after it observed the
/// cancellation flag at a checkpoint.
pub async fn cancel_running(
    pool: &SqlitePool,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'Cancelled', finished_at = ?1
        WHERE id = ?2 AND status = 'Running'
        "#,
    )
    .bind(now)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Running → Completed with the result pointer and full progress.
pub async fn complete(
    pool: &SqlitePool,
    id: Uuid,
    result_path: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'Completed', finished_at = ?1, result_path = ?2,
            progress_percent = 100.0, progress_step = 'completed', progress_message = NULL
        WHERE id = ?3 AND status = 'Running'
        "#,
    )
    .bind(now)
    .bind(result_path)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Running → Failed with a classified error.
pub async fn fail(
    pool: &SqlitePool,
    id: Uuid,
    code: &str,
    message: &str,
    details: Option<&serde_json::Value>,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'Failed', finished_at = ?1, error_code = ?2, error_message = ?3,
            error_details = ?4
        WHERE id = ?5 AND status = 'Running'
        "#,
    )
    .bind(now)
    .bind(code)
    .bind(message)
    .bind(details.map(|value| value.to_string()))
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Worker-owned progress write; percent never decreases and nothing is
/// written once the job left the Running state.
pub async fn update_progress(
    pool: &SqlitePool,
    id: Uuid,
    percent: f64,
    step: &str,
    message: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET progress_percent = MAX(progress_percent, ?1), progress_step = ?2,
            progress_message = ?3
        WHERE id = ?4 AND status = 'Running'
        "#,
    )
    .bind(percent.clamp(0.0, 100.0))
    .bind(step)
    .bind(message)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Crash recovery at startup: any job still marked Running belonged to a
/// dead worker process and is failed outright.
pub async fn recover_interrupted(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'Failed', finished_at = ?1, error_code = 'INTERRUPTED',
            error_message = 'broker restarted while the job was running'
        WHERE status = 'Running'
        "#,
    )
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Terminal jobs whose retention window expired before `cutoff`.
pub async fn list_expired(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT id FROM jobs
        WHERE status IN ('Completed', 'Failed', 'Cancelled') AND finished_at < ?1
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    Ok(ids
        .iter()
        .filter_map(|id| Uuid::parse_str(id).ok())
        .collect())
}

/// Delete a job row by ID
pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM jobs WHERE id = ?1")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Helper Functions
// =============================================================================

fn status_to_string(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "Queued",
        JobStatus::Running => "Running",
        JobStatus::Completed => "Completed",
        JobStatus::Failed => "Failed",
        JobStatus::Cancelled => "Cancelled",
    }
}

fn string_to_status(s: &str) -> JobStatus {
    match s {
        "Queued" => JobStatus::Queued,
        "Running" => JobStatus::Running,
        "Completed" => JobStatus::Completed,
        "Failed" => JobStatus::Failed,
        "Cancelled" => JobStatus::Cancelled,
        _ => JobStatus::Queued,
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value).map_err(|error| sqlx::Error::Encode(Box::new(error)))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    job_type: String,
    status: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    progress_percent: f64,
    progress_step: String,
    progress_message: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
    error_details: Option<String>,
    cancel_requested: bool,
    effective_config: String,
    input_manifest: String,
    kw_groups: Option<String>,
    result_path: Option<String>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        let error = row.error_code.map(|code| JobErrorInfo {
            code,
            message: row.error_message.unwrap_or_default(),
            details: row
                .error_details
                .as_deref()
                .and_then(|details| serde_json::from_str(details).ok()),
        });

        Job {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            job_type: row.job_type.parse().unwrap_or(
                statcomp_core::domain::job::JobType::DescriptiveOnly,
            ),
            status: string_to_status(&row.status),
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            progress: JobProgress {
                percent: row.progress_percent,
                step: row.progress_step,
                message: row.progress_message,
            },
            error,
            cancel_requested: row.cancel_requested,
            effective_config: serde_json::from_str::<EffectiveConfig>(&row.effective_config)
                .unwrap_or_default(),
            input_manifest: serde_json::from_str(&row.input_manifest).unwrap_or_default(),
            kw_groups: row
                .kw_groups
                .as_deref()
                .and_then(|groups| serde_json::from_str(groups).ok()),
            result_path: row.result_path,
        }
    }
}
