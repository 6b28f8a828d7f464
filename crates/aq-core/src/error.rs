//! Error types for AQUA

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum AqError {
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    #[error("Size mismatch in {context}: expected {expected}, got {got}")]
    SizeMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{0} used before prepare")]
    NotPrepared(&'static str),

    #[error("Sample rate conversion failed: {0}")]
    Resample(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type AqResult<T> = Result<T, AqError>;
