//! Statcomp Engine
//!
//! Statistical analysis engine for the statcomp job broker.
//!
//! The engine is CPU-bound and deliberately synchronous; the worker runtime
//! drives it on a blocking thread. Long-running loops (bootstrap resampling,
//! label permutation) call back into an [`context::ExecutionContext`] at a
//! bounded cadence so that progress reporting, cancellation and timeout
//! enforcement all happen at well-defined checkpoints instead of arbitrary
//! interruption points.

pub mod bootstrap;
pub mod context;
pub mod descriptive;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod kruskal;
pub mod report;

pub use context::{ExecutionContext, Interrupt};
pub use engine::{AnalysisEngine, AnalysisRequest, StatEngine, Workspace};
pub use error::EngineError;
pub use report::ResultDocument;
