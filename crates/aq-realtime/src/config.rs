//! Pipeline configuration

use std::path::Path;

use aq_core::{DEFAULT_SCORE_THRESHOLD, MODEL_SAMPLE_RATE};
use aq_ml::ModelConfig;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Where inference runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Convert, classify and publish on the thread that pushes samples
    #[default]
    Inline,
    /// Hand windows to a worker thread; the pushing thread only copies
    Background,
}

/// Full pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Inference model
    pub model: ModelConfig,

    /// Scores strictly above this land in the above-threshold set (0.0 - 1.0)
    pub threshold: f32,

    /// Detection rate handed to `prepare` (Hz). Windows are always
    /// converted to the model's 16 kHz.
    pub detection_rate_hz: f64,

    /// Where inference runs
    pub mode: ExecutionMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            threshold: DEFAULT_SCORE_THRESHOLD,
            detection_rate_hz: MODEL_SAMPLE_RATE,
            mode: ExecutionMode::Inline,
        }
    }
}

impl PipelineConfig {
    /// Inline inference, for offline rendering and tests
    pub fn offline(model_path: impl AsRef<Path>) -> Self {
        Self {
            model: ModelConfig::yamnet(model_path),
            ..Self::default()
        }
    }

    /// Background inference, for live audio callbacks
    pub fn live(model_path: impl AsRef<Path>) -> Self {
        Self {
            model: ModelConfig::yamnet(model_path),
            mode: ExecutionMode::Background,
            ..Self::default()
        }
    }

    /// Read a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate configuration
    pub fn validate(&self) -> PipelineResult<()> {
        self.model.validate()?;

        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "threshold must be between 0.0 and 1.0, got {}",
                self.threshold
            )));
        }

        if !self.detection_rate_hz.is_finite() || self.detection_rate_hz <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "detection rate must be positive, got {}",
                self.detection_rate_hz
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.detection_rate_hz, 16000.0);
        assert_eq!(config.mode, ExecutionMode::Inline);
    }

    #[test]
    fn test_presets() {
        assert_eq!(PipelineConfig::offline("m.onnx").mode, ExecutionMode::Inline);
        let live = PipelineConfig::live("m.onnx");
        assert_eq!(live.mode, ExecutionMode::Background);
        assert_eq!(live.model.path.to_str(), Some("m.onnx"));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = PipelineConfig::default();
        config.threshold = 1.2;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.detection_rate_hz = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.model.output_names.pop();
        assert!(matches!(config.validate(), Err(PipelineError::Ml(_))));
    }

    #[test]
    fn test_from_json_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "threshold": 0.3, "mode": "background", "model": {{ "path": "nets/yamnet.onnx" }} }}"#
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.threshold, 0.3);
        assert_eq!(config.mode, ExecutionMode::Background);
        assert_eq!(config.model.input_name, "waveform");
        assert_eq!(config.detection_rate_hz, 16000.0);
    }

    #[test]
    fn test_from_json_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "threshold": 7.0 }}"#).unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(file.path()),
            Err(PipelineError::InvalidConfig(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(file.path()),
            Err(PipelineError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = PipelineConfig::live("a.onnx");
        let json = config.to_json().unwrap();
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
