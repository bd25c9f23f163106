//! Worker runtime
//!
//! A fixed pool of tasks claims queued jobs from the store and drives the
//! analysis engine on blocking threads, streaming progress back and enforcing
//! cooperative cancellation and the wall-clock deadline at the engine's
//! checkpoints. A separate sweeper task enforces the retention TTL.

pub mod pool;
pub mod runner;

pub use pool::{spawn_retention_sweeper, spawn_workers};
