//! Shared application state
//!
//! The job store is the only shared mutable state; everything here is either
//! a handle to it or one of the two in-process coordination primitives: the
//! queue wake-up and the cancellation registry.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use sqlx::SqlitePool;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::config::Config;

/// In-process cancellation flags, polled by workers at analysis checkpoints.
///
/// The durable counterpart lives in the `cancel_requested` column; this
/// registry is what makes the checkpoint poll cheap.
#[derive(Clone, Default)]
pub struct CancelRegistry {
    inner: Arc<Mutex<HashSet<Uuid>>>,
}

impl CancelRegistry {
    pub fn request(&self, job_id: Uuid) {
        self.lock().insert(job_id);
    }

    pub fn is_requested(&self, job_id: Uuid) -> bool {
        self.lock().contains(&job_id)
    }

    pub fn clear(&self, job_id: Uuid) {
        self.lock().remove(&job_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        // A flag set is safe to keep using even after a panic elsewhere.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// State shared by the API layer and the worker runtime
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub cancel: CancelRegistry,
    /// Wakes idle workers when a job is enqueued.
    pub queue: Arc<Notify>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            cancel: CancelRegistry::default(),
            queue: Arc::new(Notify::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_registry_round_trip() {
        let registry = CancelRegistry::default();
        let job_id = Uuid::new_v4();
        assert!(!registry.is_requested(job_id));
        registry.request(job_id);
        assert!(registry.is_requested(job_id));
        registry.clear(job_id);
        assert!(!registry.is_requested(job_id));
    }
}
