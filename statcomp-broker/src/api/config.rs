//! Config API Handler

use axum::Json;

use statcomp_core::config::EffectiveConfig;

/// GET /config/defaults
/// The analysis defaults a submission starts from before overrides.
pub async fn get_defaults() -> Json<EffectiveConfig> {
    Json(EffectiveConfig::default())
}
