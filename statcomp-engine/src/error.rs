//! Engine error types

use thiserror::Error;

use crate::context::Interrupt;

/// Errors raised by the analysis engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Cooperative abort observed at a checkpoint; not a failure of the
    /// analysis itself.
    #[error("analysis interrupted")]
    Interrupted(Interrupt),
}

impl From<Interrupt> for EngineError {
    fn from(interrupt: Interrupt) -> Self {
        EngineError::Interrupted(interrupt)
    }
}
