//! CLI configuration

/// Runtime configuration resolved from flags and environment
pub struct Config {
    /// Base URL of the broker API
    pub broker_url: String,
}
