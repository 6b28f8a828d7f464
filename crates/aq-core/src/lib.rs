//! aq-core: Shared types and constants for the AQUA classification pipeline
//!
//! Everything that more than one crate needs to agree on lives here: the
//! model's fixed tensor geometry, the stream configuration handed over by the
//! host, and the size derivation that ties the two together.

mod error;
mod stream;

pub use error::*;
pub use stream::*;

/// Sample rate the classifier was trained at
pub const MODEL_SAMPLE_RATE: f64 = 16000.0;

/// Classifier input length in samples (0.96 s @ 16 kHz)
pub const CLASSIFIER_WINDOW_LEN: usize = 15360;

/// Number of AudioSet classes scored per window
pub const NUM_CLASSES: usize = 521;

/// Length of the embedding output
pub const EMBEDDING_LEN: usize = 1024;

/// Log-mel patch geometry (frames x bands)
pub const PATCH_FRAMES: usize = 96;
pub const PATCH_BANDS: usize = 64;

/// Default cutoff for the above-threshold set
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
