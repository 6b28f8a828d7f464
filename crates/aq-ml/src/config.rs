//! Model configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MlError, MlResult};
use crate::{models, tensors};

/// Where the model lives and how its tensors are named
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the ONNX file
    pub path: PathBuf,

    /// Name of the waveform input tensor
    pub input_name: String,

    /// Output tensor names in order: scores, embedding, log-mel patch
    pub output_names: Vec<String>,

    /// Run tract's graph optimiser at load time
    pub optimize_graph: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(models::YAMNET),
            input_name: tensors::WAVEFORM.to_string(),
            output_names: vec![
                tensors::SCORES.to_string(),
                tensors::EMBEDDING.to_string(),
                tensors::LOG_MEL.to_string(),
            ],
            optimize_graph: true,
        }
    }
}

impl ModelConfig {
    /// YAMNet export at `path` with the standard tensor names
    pub fn yamnet(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Check names before touching the file system
    pub fn validate(&self) -> MlResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(MlError::InvalidConfig("model path is empty".into()));
        }
        if self.input_name.is_empty() {
            return Err(MlError::InvalidConfig("input tensor name is empty".into()));
        }
        if self.output_names.len() != 3 {
            return Err(MlError::InvalidConfig(format!(
                "expected 3 output tensor names, got {}",
                self.output_names.len()
            )));
        }
        if self.output_names.iter().any(String::is_empty) {
            return Err(MlError::InvalidConfig("output tensor name is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let config = ModelConfig::default();
        assert_eq!(config.input_name, "waveform");
        assert_eq!(config.output_names, ["output_0", "output_1", "output_2"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ModelConfig =
            serde_json::from_str(r#"{ "path": "/opt/aqua/yamnet.onnx" }"#).unwrap();
        assert_eq!(config.path, PathBuf::from("/opt/aqua/yamnet.onnx"));
        assert_eq!(config.input_name, "waveform");
        assert!(config.optimize_graph);
    }

    #[test]
    fn test_validate_rejects_bad_outputs() {
        let mut config = ModelConfig::yamnet("model.onnx");
        config.output_names.pop();
        assert!(config.validate().is_err());

        let mut config = ModelConfig::yamnet("");
        assert!(config.validate().is_err());
        config.path = "model.onnx".into();
        config.input_name.clear();
        assert!(config.validate().is_err());
    }
}
