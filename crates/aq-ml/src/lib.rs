//! # AQUA ML
//!
//! Audio event classification with a YAMNet-style ONNX model:
//! - Fixed-shape inference session (tract, pure Rust)
//! - Reusable score storage with stale-but-valid semantics on failure
//! - Category folding of the 521 AudioSet classes
//!
//! ## Real-time Considerations
//!
//! `ClassificationEngine::classify` is a blocking call whose latency depends
//! on the model and the machine. It is the one unbounded step on the render
//! path; keep the hop interval comfortably above measured inference time or
//! run the engine on a worker thread.

mod categories;
mod classifier;
mod config;
mod error;
mod inference;

pub use categories::{CategoryConfidence, SoundCategory, categories_for, category_confidences};
pub use classifier::{ClassificationEngine, InferenceBackend, ModelOutputs};
pub use config::ModelConfig;
pub use error::{MlError, MlResult};
pub use inference::InferenceEngine;

/// Model file locations
pub mod models {
    /// YAMNet ONNX export
    pub const YAMNET: &str = "models/yamnet.onnx";
}

/// Tensor names of the YAMNet export
pub mod tensors {
    /// Mono waveform input `[15360]`
    pub const WAVEFORM: &str = "waveform";

    /// Class scores `[1, 521]`
    pub const SCORES: &str = "output_0";

    /// Embedding `[1, 1024]`
    pub const EMBEDDING: &str = "output_1";

    /// Log-mel patch `[96, 64]`
    pub const LOG_MEL: &str = "output_2";
}
