//! Audio event classification
//!
//! [`ClassificationEngine`] owns the score storage and drives one inference
//! per window through an [`InferenceBackend`]. Results are written to a
//! staging set and swapped in only when the run succeeds, so a failed call
//! leaves the previous scores intact.

use aq_core::{CLASSIFIER_WINDOW_LEN, EMBEDDING_LEN, NUM_CLASSES, PATCH_BANDS, PATCH_FRAMES};

use crate::config::ModelConfig;
use crate::error::{MlError, MlResult};
use crate::inference::InferenceEngine;

/// Output tensors of one inference call
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutputs {
    /// Class scores `[1, 521]`
    pub scores: Vec<f32>,
    /// Embedding `[1, 1024]`
    pub embedding: Vec<f32>,
    /// Log-mel patch `[96, 64]`, row-major
    pub log_mel: Vec<f32>,
}

impl ModelOutputs {
    /// Zeroed outputs with the model's fixed shapes
    pub fn new() -> Self {
        Self {
            scores: vec![0.0; NUM_CLASSES],
            embedding: vec![0.0; EMBEDDING_LEN],
            log_mel: vec![0.0; PATCH_FRAMES * PATCH_BANDS],
        }
    }
}

impl Default for ModelOutputs {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that can run the classifier graph.
///
/// Implementations fill every field of `outputs` on success. The engine
/// discards `outputs` when `run` returns an error.
pub trait InferenceBackend: Send {
    fn run(&mut self, waveform: &[f32], outputs: &mut ModelOutputs) -> MlResult<()>;

    /// Short name for logs
    fn name(&self) -> &str {
        "backend"
    }
}

impl<B: InferenceBackend + ?Sized> InferenceBackend for Box<B> {
    fn run(&mut self, waveform: &[f32], outputs: &mut ModelOutputs) -> MlResult<()> {
        (**self).run(waveform, outputs)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Classifier session plus reusable output storage
pub struct ClassificationEngine<B: InferenceBackend = InferenceEngine> {
    backend: B,
    /// Last successful outputs
    outputs: ModelOutputs,
    /// Written by the backend, swapped with `outputs` on success
    staging: ModelOutputs,
    /// Successful inference count
    inferences: u64,
}

impl ClassificationEngine<InferenceEngine> {
    /// Load the ONNX model. A missing or broken model is returned as an
    /// error; there is no way to obtain an engine without a session.
    pub fn load(config: ModelConfig) -> MlResult<Self> {
        Ok(Self::with_backend(InferenceEngine::new(config)?))
    }
}

impl<B: InferenceBackend> ClassificationEngine<B> {
    /// Wrap an already constructed backend
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            outputs: ModelOutputs::new(),
            staging: ModelOutputs::new(),
            inferences: 0,
        }
    }

    /// Classify one model-rate window.
    ///
    /// Returns the class scores, valid until the next call. On error the
    /// previous scores are kept.
    pub fn classify(&mut self, window: &[f32]) -> MlResult<&[f32]> {
        if window.len() != CLASSIFIER_WINDOW_LEN {
            return Err(MlError::InvalidInputShape {
                expected: format!("[{CLASSIFIER_WINDOW_LEN}]"),
                got: format!("[{}]", window.len()),
            });
        }

        self.backend.run(window, &mut self.staging)?;

        if self.staging.scores.len() != NUM_CLASSES {
            let got = self.staging.scores.len();
            // Backend broke the shape contract; restore the staging size
            self.staging = ModelOutputs::new();
            return Err(MlError::InvalidOutputShape {
                expected: format!("[1, {NUM_CLASSES}]"),
                got: format!("[1, {got}]"),
            });
        }

        std::mem::swap(&mut self.outputs, &mut self.staging);
        self.inferences += 1;

        Ok(&self.outputs.scores)
    }

    /// Class scores from the last successful call
    pub fn scores(&self) -> &[f32] {
        &self.outputs.scores
    }

    /// Embedding from the last successful call
    pub fn embedding(&self) -> &[f32] {
        &self.outputs.embedding
    }

    /// Log-mel patch from the last successful call
    pub fn log_mel_patch(&self) -> &[f32] {
        &self.outputs.log_mel
    }

    pub fn outputs(&self) -> &ModelOutputs {
        &self.outputs
    }

    /// Successful inferences since construction
    pub fn inference_count(&self) -> u64 {
        self.inferences
    }

    /// Required input length
    pub fn input_len(&self) -> usize {
        CLASSIFIER_WINDOW_LEN
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
