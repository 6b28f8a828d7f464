//! ONNX inference engine
//!
//! Wraps a tract plan built once at load time with the waveform input fixed to
//! the classifier window length. Each run is a single synchronous call.

use std::path::Path;

use aq_core::{CLASSIFIER_WINDOW_LEN, EMBEDDING_LEN, NUM_CLASSES, PATCH_BANDS, PATCH_FRAMES};
use tract_onnx::prelude::*;

use crate::classifier::{InferenceBackend, ModelOutputs};
use crate::config::ModelConfig;
use crate::error::{MlError, MlResult};

/// Tract runnable plan
type TractPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Loaded inference session
pub struct InferenceEngine {
    /// Runnable plan (reused for every call)
    plan: TractPlan,
    /// Configuration the session was built from
    config: ModelConfig,
}

impl InferenceEngine {
    /// Load and optimise the model described by `config`
    pub fn new(config: ModelConfig) -> MlResult<Self> {
        config.validate()?;

        let path = config.path.as_path();
        if !path.exists() {
            return Err(MlError::ModelNotFound {
                path: path.display().to_string(),
            });
        }

        let plan = Self::load_tract_model(path, &config)?;

        log::info!(
            "Loaded model {} (input '{}', outputs {:?})",
            path.display(),
            config.input_name,
            config.output_names
        );

        Ok(Self { plan, config })
    }

    /// Build the tract plan with named, fixed-shape tensors
    fn load_tract_model(path: &Path, config: &ModelConfig) -> MlResult<TractPlan> {
        let load_err = |e: TractError| MlError::ModelLoadFailed {
            reason: format!("{}: {e}", path.display()),
        };

        let mut model = tract_onnx::onnx().model_for_path(path).map_err(load_err)?;

        model
            .set_input_names([config.input_name.as_str()])
            .map_err(load_err)?;
        model
            .set_output_names(config.output_names.iter().map(String::as_str))
            .map_err(load_err)?;

        let model = model
            .with_input_fact(0, f32::fact([CLASSIFIER_WINDOW_LEN]).into())
            .map_err(load_err)?;

        let typed = if config.optimize_graph {
            model.into_optimized()
        } else {
            model.into_typed()
        }
        .map_err(load_err)?;

        typed.into_runnable().map_err(load_err)
    }

    /// Run the session on one waveform and return raw output tensors
    pub fn run_waveform(&self, waveform: &[f32]) -> MlResult<TVec<TValue>> {
        if waveform.len() != CLASSIFIER_WINDOW_LEN {
            return Err(MlError::InvalidInputShape {
                expected: format!("[{CLASSIFIER_WINDOW_LEN}]"),
                got: format!("[{}]", waveform.len()),
            });
        }

        let input = Tensor::from_shape(&[waveform.len()], waveform)
            .map_err(|e| MlError::TractError(e.to_string()))?;

        self.plan
            .run(tvec!(input.into()))
            .map_err(|e| MlError::InferenceFailed {
                reason: e.to_string(),
            })
    }

    /// Configuration the session was loaded with
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

/// View an output tensor as f32, checking its shape
fn output_slice<'a>(value: &'a TValue, name: &str, shape: &[usize]) -> MlResult<&'a [f32]> {
    if value.shape() != shape {
        return Err(MlError::InvalidOutputShape {
            expected: format!("{name} {shape:?}"),
            got: format!("{:?}", value.shape()),
        });
    }
    value
        .as_slice::<f32>()
        .map_err(|e| MlError::TractError(e.to_string()))
}

impl InferenceBackend for InferenceEngine {
    fn run(&mut self, waveform: &[f32], outputs: &mut ModelOutputs) -> MlResult<()> {
        let results = self.run_waveform(waveform)?;

        if results.len() != 3 {
            return Err(MlError::InvalidOutputShape {
                expected: "3 output tensors".into(),
                got: format!("{} output tensors", results.len()),
            });
        }

        let names = &self.config.output_names;
        let scores = output_slice(&results[0], &names[0], &[1, NUM_CLASSES])?;
        let embedding = output_slice(&results[1], &names[1], &[1, EMBEDDING_LEN])?;
        let log_mel = output_slice(&results[2], &names[2], &[PATCH_FRAMES, PATCH_BANDS])?;

        outputs.scores.copy_from_slice(scores);
        outputs.embedding.copy_from_slice(embedding);
        outputs.log_mel.copy_from_slice(log_mel);

        Ok(())
    }

    fn name(&self) -> &str {
        "tract"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_reported() {
        let config = ModelConfig::yamnet("/nonexistent/aqua/yamnet.onnx");
        match InferenceEngine::new(config) {
            Err(MlError::ModelNotFound { path }) => assert!(path.contains("yamnet.onnx")),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("loaded a model that does not exist"),
        }
    }

    #[test]
    fn test_invalid_config_rejected_before_io() {
        let mut config = ModelConfig::yamnet("/nonexistent/aqua/yamnet.onnx");
        config.output_names.clear();
        assert!(matches!(
            InferenceEngine::new(config),
            Err(MlError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_garbage_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.onnx");
        std::fs::write(&path, b"definitely not protobuf").unwrap();

        assert!(matches!(
            InferenceEngine::new(ModelConfig::yamnet(&path)),
            Err(MlError::ModelLoadFailed { .. })
        ));
    }
}
