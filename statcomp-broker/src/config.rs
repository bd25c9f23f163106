//! Broker configuration
//!
//! Defines all configurable parameters for the broker including the bind
//! address, storage locations, upload limits and the worker runtime knobs
//! (concurrency, timeout, poll cadence, retention).

use std::path::PathBuf;
use std::time::Duration;

/// Broker configuration
///
/// All limits and intervals are configurable to allow tuning for different
/// deployment scenarios (dev vs prod, small vs large uploads).
#[derive(Debug, Clone)]
pub struct Config {
    /// Socket address the HTTP server binds to
    pub bind_addr: String,

    /// SQLite connection string for the job store
    pub database_url: String,

    /// Base directory for per-job working data
    pub storage_root: PathBuf,

    /// Maximum allowed upload size per file, in megabytes
    pub max_upload_mb: u64,

    /// Wall-clock timeout enforced for running jobs
    pub job_timeout: Duration,

    /// Number of worker tasks, which is also the max number of jobs
    /// processed concurrently
    pub max_concurrent_jobs: usize,

    /// Submissions are rejected while this many jobs are already queued
    pub max_queue_depth: i64,

    /// How often an idle worker re-checks the queue
    pub worker_poll_interval: Duration,

    /// Retention window for terminal jobs before the sweep removes them
    pub retention_ttl: Duration,

    /// How often the retention sweep runs
    pub sweep_interval: Duration,

    /// Analysis loop iterations between cancellation/timeout checkpoints
    pub checkpoint_every: u32,
}

impl Config {
    /// Creates configuration from environment variables, falling back to the
    /// defaults for anything unset.
    ///
    /// Recognized variables (all optional):
    /// - STATCOMP_BIND_ADDR (default: 0.0.0.0:8080)
    /// - STATCOMP_DATABASE_URL (default: sqlite://statcomp.db?mode=rwc)
    /// - STATCOMP_STORAGE_ROOT (default: /tmp/statcomp)
    /// - STATCOMP_MAX_UPLOAD_MB (default: 100)
    /// - STATCOMP_JOB_TIMEOUT_SECS (default: 1800)
    /// - STATCOMP_MAX_CONCURRENT_JOBS (default: 2)
    /// - STATCOMP_MAX_QUEUE_DEPTH (default: 32)
    /// - STATCOMP_WORKER_POLL_INTERVAL_SECS (default: 5)
    /// - STATCOMP_RETENTION_TTL_HOURS (default: 24)
    /// - STATCOMP_SWEEP_INTERVAL_SECS (default: 3600)
    /// - STATCOMP_CHECKPOINT_EVERY (default: 25)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_string("STATCOMP_BIND_ADDR", defaults.bind_addr),
            database_url: env_string("STATCOMP_DATABASE_URL", defaults.database_url),
            storage_root: PathBuf::from(env_string(
                "STATCOMP_STORAGE_ROOT",
                defaults.storage_root.to_string_lossy().into_owned(),
            )),
            max_upload_mb: env_u64("STATCOMP_MAX_UPLOAD_MB", defaults.max_upload_mb),
            job_timeout: env_secs("STATCOMP_JOB_TIMEOUT_SECS", defaults.job_timeout),
            max_concurrent_jobs: env_u64(
                "STATCOMP_MAX_CONCURRENT_JOBS",
                defaults.max_concurrent_jobs as u64,
            ) as usize,
            max_queue_depth: env_u64("STATCOMP_MAX_QUEUE_DEPTH", defaults.max_queue_depth as u64)
                as i64,
            worker_poll_interval: env_secs(
                "STATCOMP_WORKER_POLL_INTERVAL_SECS",
                defaults.worker_poll_interval,
            ),
            retention_ttl: std::env::var("STATCOMP_RETENTION_TTL_HOURS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(|hours| Duration::from_secs(hours * 3600))
                .unwrap_or(defaults.retention_ttl),
            sweep_interval: env_secs("STATCOMP_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            checkpoint_every: env_u64("STATCOMP_CHECKPOINT_EVERY", u64::from(defaults.checkpoint_every))
                as u32,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        (self.max_upload_mb as usize) * 1024 * 1024
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.database_url.is_empty() {
            anyhow::bail!("database_url cannot be empty");
        }

        if self.max_upload_mb == 0 {
            anyhow::bail!("max_upload_mb must be greater than 0");
        }

        if self.job_timeout.as_secs() == 0 {
            anyhow::bail!("job_timeout must be greater than 0");
        }

        if self.max_concurrent_jobs == 0 {
            anyhow::bail!("max_concurrent_jobs must be greater than 0");
        }

        if self.max_queue_depth <= 0 {
            anyhow::bail!("max_queue_depth must be greater than 0");
        }

        if self.worker_poll_interval.as_millis() == 0 {
            anyhow::bail!("worker_poll_interval must be greater than 0");
        }

        if self.checkpoint_every == 0 {
            anyhow::bail!("checkpoint_every must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: "sqlite://statcomp.db?mode=rwc".to_string(),
            storage_root: PathBuf::from("/tmp/statcomp"),
            max_upload_mb: 100,
            job_timeout: Duration::from_secs(1800),
            max_concurrent_jobs: 2,
            max_queue_depth: 32,
            worker_poll_interval: Duration::from_secs(5),
            retention_ttl: Duration::from_secs(24 * 3600),
            sweep_interval: Duration::from_secs(3600),
            checkpoint_every: 25,
        }
    }
}

fn env_string(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_upload_bytes(), 100 * 1024 * 1024);
        assert_eq!(config.job_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.max_concurrent_jobs = 0;
        assert!(config.validate().is_err());

        config.max_concurrent_jobs = 2;
        config.max_upload_mb = 0;
        assert!(config.validate().is_err());

        config.max_upload_mb = 10;
        config.max_queue_depth = 0;
        assert!(config.validate().is_err());
    }
}
