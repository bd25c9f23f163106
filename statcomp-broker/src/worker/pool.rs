//! Worker pool and retention sweeper
//!
//! Each worker loops on {queue wake-up | poll interval}, draining the queue
//! before sleeping again. Pool size doubles as the global concurrency limit:
//! a claim only happens on a free worker, so at-capacity dequeues are simply
//! deferred and the jobs stay queued.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use statcomp_engine::AnalysisEngine;

use crate::repository::job_repository;
use crate::state::AppState;
use crate::storage;
use crate::worker::runner;

/// Spawn the worker pool; one task per allowed concurrent job.
pub fn spawn_workers(
    state: AppState,
    engine: Arc<dyn AnalysisEngine>,
) -> Vec<JoinHandle<()>> {
    (0..state.config.max_concurrent_jobs)
        .map(|index| {
            let state = state.clone();
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { worker_loop(index, state, engine).await })
        })
        .collect()
}

async fn worker_loop(index: usize, state: AppState, engine: Arc<dyn AnalysisEngine>) {
    debug!("worker {} started", index);
    loop {
        match job_repository::claim_next_queued(&state.pool, Utc::now()).await {
            Ok(Some(job)) => {
                info!("worker {} claimed job {}", index, job.id);
                runner::process(&state, Arc::clone(&engine), job).await;
                // Drain the queue before going back to sleep.
                continue;
            }
            Ok(None) => {}
            Err(error) => {
                error!("worker {}: claim failed: {}", index, error);
            }
        }

        tokio::select! {
            _ = state.queue.notified() => {}
            _ = tokio::time::sleep(state.config.worker_poll_interval) => {}
        }
    }
}

/// Spawn the retention sweeper: terminal jobs older than the TTL lose their
/// storage and their row.
pub fn spawn_retention_sweeper(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.config.sweep_interval);
        loop {
            ticker.tick().await;
            if let Err(error) = sweep_expired(&state).await {
                warn!("retention sweep failed: {}", error);
            }
        }
    })
}

async fn sweep_expired(state: &AppState) -> Result<(), sqlx::Error> {
    let ttl = chrono::Duration::from_std(state.config.retention_ttl)
        .unwrap_or_else(|_| chrono::Duration::hours(24));
    let cutoff = Utc::now() - ttl;

    let expired = job_repository::list_expired(&state.pool, cutoff).await?;
    for job_id in expired {
        storage::cleanup_job(&storage::job_paths(&state.config.storage_root, job_id));
        if job_repository::delete(&state.pool, job_id).await? {
            info!("retention sweep removed job {}", job_id);
        }
    }
    Ok(())
}
