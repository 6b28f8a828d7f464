//! Error types for ML processing

use thiserror::Error;

/// ML processing error types
#[derive(Error, Debug)]
pub enum MlError {
    /// Model file not found
    #[error("Model not found: {path}")]
    ModelNotFound { path: String },

    /// Model loading failed
    #[error("Failed to load model: {reason}")]
    ModelLoadFailed { reason: String },

    /// Inference failed
    #[error("Inference failed: {reason}")]
    InferenceFailed { reason: String },

    /// Invalid input shape
    #[error("Invalid input shape: expected {expected}, got {got}")]
    InvalidInputShape { expected: String, got: String },

    /// Invalid output shape
    #[error("Invalid output shape: expected {expected}, got {got}")]
    InvalidOutputShape { expected: String, got: String },

    /// Invalid model configuration
    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    /// Tract error
    #[error("Tract error: {0}")]
    TractError(String),

    /// Config (de)serialization error
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for ML operations
pub type MlResult<T> = Result<T, MlError>;
