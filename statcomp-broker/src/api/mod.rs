//! API Module
//!
//! HTTP API layer for the broker.
//! Each submodule handles endpoints for a specific domain.

pub mod config;
pub mod error;
pub mod health;
pub mod job;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    // Room for the largest accepted upload set: three files plus form
    // overhead.
    let body_limit = state.config.max_upload_bytes().saturating_mul(4);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Analysis defaults
        .route("/config/defaults", get(config::get_defaults))
        // Job endpoints
        .route("/jobs", post(job::create_job))
        .route("/jobs/{id}", get(job::get_job))
        .route("/jobs/{id}/cancel", post(job::cancel_job))
        .route("/jobs/{id}/results", get(job::get_results))
        .route("/jobs/{id}/artifacts", get(job::list_artifacts))
        .route("/jobs/{id}/artifacts/{*name}", get(job::download_artifact))
        // Add state and middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
