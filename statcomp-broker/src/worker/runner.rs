//! Per-job execution
//!
//! Owns the Running phase of exactly one claimed job: builds the execution
//! context (progress channel, cancellation/deadline guard), runs the engine
//! on a blocking thread, and performs the terminal transition plus storage
//! cleanup. A failing job must never take the worker down, so everything is
//! caught at the top of [`process`].

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use statcomp_engine::context::{GuardFn, ProgressFn};
use statcomp_engine::engine::Workspace;
use statcomp_engine::report::RESULTS_FILE;
use statcomp_engine::{AnalysisEngine, AnalysisRequest, EngineError, ExecutionContext, Interrupt};

use statcomp_core::domain::job::Job;

use crate::repository::job_repository;
use crate::state::AppState;
use crate::storage;

/// Process one claimed job to its terminal state.
pub async fn process(state: &AppState, engine: Arc<dyn AnalysisEngine>, job: Job) {
    let job_id = job.id;
    if let Err(error) = execute(state, engine, job).await {
        error!("job {}: worker error: {:#}", job_id, error);
        match job_repository::fail(
            &state.pool,
            job_id,
            "ANALYSIS_ERROR",
            "internal error during analysis",
            None,
            Utc::now(),
        )
        .await
        {
            Ok(_) => {}
            Err(db_error) => error!("job {}: could not record failure: {}", job_id, db_error),
        }
    }
    state.cancel.clear(job_id);
}

async fn execute(
    state: &AppState,
    engine: Arc<dyn AnalysisEngine>,
    job: Job,
) -> anyhow::Result<()> {
    let job_id = job.id;
    let paths = storage::job_paths(&state.config.storage_root, job_id);
    let started_at = job.started_at.unwrap_or_else(Utc::now);
    let deadline = started_at + chrono::Duration::from_std(state.config.job_timeout)?;

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let progress_writer = spawn_progress_writer(state.pool.clone(), job_id, progress_rx);

    let cancel = state.cancel.clone();
    let guard: Box<GuardFn> = Box::new(move || {
        if cancel.is_requested(job_id) {
            return Err(Interrupt::Cancelled);
        }
        if Utc::now() > deadline {
            return Err(Interrupt::TimedOut);
        }
        Ok(())
    });
    let progress: Box<ProgressFn> = Box::new(move |percent, step, message| {
        let _ = progress_tx.send(ProgressUpdate {
            percent,
            step: step.to_string(),
            message: message.map(str::to_string),
        });
    });
    let ctx = ExecutionContext::new(progress, guard, state.config.checkpoint_every);

    let request = AnalysisRequest {
        job_id,
        job_type: job.job_type,
        config: job.effective_config.clone(),
        workspace: Workspace {
            input_dir: paths.input_dir.clone(),
            output_dir: paths.output_dir.clone(),
        },
        kw_groups: job.kw_groups.clone().unwrap_or_default(),
    };

    let outcome = tokio::task::spawn_blocking(move || engine.run(&request, &ctx)).await;

    // The engine dropped the context (and with it the progress sender);
    // wait for the writer to flush its backlog before the terminal write.
    let _ = progress_writer.await;

    let now = Utc::now();
    match outcome {
        Ok(Ok(_document)) => {
            job_repository::complete(&state.pool, job_id, RESULTS_FILE, now).await?;
            if job.effective_config.clean_all {
                storage::cleanup_intermediate(&paths);
            }
            info!("job {} completed", job_id);
        }
        Ok(Err(EngineError::Interrupted(Interrupt::Cancelled))) => {
            job_repository::cancel_running(&state.pool, job_id, now).await?;
            storage::cleanup_job(&paths);
            info!("job {} cancelled", job_id);
        }
        Ok(Err(EngineError::Interrupted(Interrupt::TimedOut))) => {
            job_repository::fail(
                &state.pool,
                job_id,
                "TIMEOUT",
                "job exceeded the configured time limit",
                None,
                now,
            )
            .await?;
            storage::cleanup_job(&paths);
            warn!("job {} timed out", job_id);
        }
        Ok(Err(engine_error)) => {
            job_repository::fail(
                &state.pool,
                job_id,
                "ANALYSIS_ERROR",
                &engine_error.to_string(),
                None,
                now,
            )
            .await?;
            storage::cleanup_job(&paths);
            warn!("job {} failed: {}", job_id, engine_error);
        }
        Err(join_error) => {
            job_repository::fail(
                &state.pool,
                job_id,
                "ANALYSIS_ERROR",
                "analysis task aborted unexpectedly",
                None,
                now,
            )
            .await?;
            storage::cleanup_job(&paths);
            error!("job {}: analysis task panicked: {}", job_id, join_error);
        }
    }

    Ok(())
}

struct ProgressUpdate {
    percent: f64,
    step: String,
    message: Option<String>,
}

/// Drains the progress channel into the job store. Cadence is bounded by the
/// engine's checkpoint interval; the store-side monotonic guard makes
/// out-of-order flushes harmless.
fn spawn_progress_writer(
    pool: sqlx::SqlitePool,
    job_id: Uuid,
    mut rx: mpsc::UnboundedReceiver<ProgressUpdate>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            if let Err(error) = job_repository::update_progress(
                &pool,
                job_id,
                update.percent,
                &update.step,
                update.message.as_deref(),
            )
            .await
            {
                warn!("job {}: progress write failed: {}", job_id, error);
            }
        }
    })
}
