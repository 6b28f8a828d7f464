//! Error types for the real-time pipeline

use aq_core::AqError;
use aq_ml::MlError;
use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] AqError),

    #[error(transparent)]
    Ml(#[from] MlError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start classification worker: {0}")]
    WorkerSpawn(String),

    #[error("Classification worker panicked")]
    WorkerPanicked,

    /// A worker panic took the inference session with it. The classifier
    /// cannot be prepared again; build a new one.
    #[error("Inference session lost in an earlier worker failure")]
    SessionLost,
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
