//! Statcomp Broker
//!
//! Single-binary web front-end and job broker: an axum API facade over a
//! SQLite job store whose Queued rows form the durable work queue, plus an
//! in-process worker pool driving the statistical engine.
//!
//! Startup order matters: crash recovery runs before any worker is spawned
//! so that jobs orphaned by a previous process are failed instead of being
//! mistaken for live work.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use statcomp_broker::repository::job_repository;
use statcomp_broker::state::AppState;
use statcomp_broker::{api, config::Config, db, worker};
use statcomp_engine::{AnalysisEngine, StatEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "statcomp_broker=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting statcomp broker...");

    let config = Config::from_env();
    config.validate()?;
    info!(
        "Loaded configuration: bind_addr={}, storage_root={}, workers={}",
        config.bind_addr,
        config.storage_root.display(),
        config.max_concurrent_jobs
    );

    std::fs::create_dir_all(&config.storage_root)
        .context("Failed to create storage root directory")?;

    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    // Fail jobs a previous process left Running before workers start.
    let recovered = job_repository::recover_interrupted(&pool, Utc::now()).await?;
    if recovered > 0 {
        info!("Recovered {} interrupted job(s) from a previous run", recovered);
    }

    let state = AppState::new(pool, config);

    let engine: Arc<dyn AnalysisEngine> = Arc::new(StatEngine::new());
    let workers = worker::spawn_workers(state.clone(), engine);
    info!("Worker pool started with {} worker(s)", workers.len());

    worker::spawn_retention_sweeper(state.clone());

    let app = api::create_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&state.config.bind_addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on {}", state.config.bind_addr);

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
