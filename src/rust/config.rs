use std::env;
use std::path::{Path, PathBuf};

use candle_core::Device;

use crate::labels::{LabelSchema, SelectionPolicy};

/// Fixed padded sequence length used in training and inference.
pub const MAX_SEQUENCE_LENGTH: usize = 100;
/// Number of emotions returned by the top-k policy.
pub const DEFAULT_TOP_K: usize = 3;
/// Minimum score for the threshold policy.
pub const DEFAULT_THRESHOLD: f32 = 0.5;
/// Vocabulary size cap, padding and OOV ids included.
pub const DEFAULT_NUM_WORDS: usize = 20000;
pub const DEFAULT_OOV_TOKEN: &str = "<OOV>";
pub const DEFAULT_TEXT_COLUMN: &str = "text";
pub const DEFAULT_DATA_PATH: &str = "data/go_emotions_dataset.csv";

/// Directory holding the trained artifacts unless `EMOTIVE_ARTIFACTS` is set.
pub const DEFAULT_ARTIFACTS_DIR: &str = "saved_models";
pub const MODEL_FILE_NAME: &str = "birnn_model.safetensors";
pub const TOKENIZER_FILE_NAME: &str = "tokenizer.json";

/// Locations of a model checkpoint and the vocabulary it was trained with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub tokenizer: PathBuf,
}

impl ArtifactPaths {
    /// Returns the default artifacts directory
    pub fn default_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("EMOTIVE_ARTIFACTS") {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        // 2. Relative to the working directory
        PathBuf::from(DEFAULT_ARTIFACTS_DIR)
    }

    /// Artifact files inside `dir` using the standard file names.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            model: dir.join(MODEL_FILE_NAME),
            tokenizer: dir.join(TOKENIZER_FILE_NAME),
        }
    }

    pub fn new(model: impl Into<PathBuf>, tokenizer: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            tokenizer: tokenizer.into(),
        }
    }
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self::in_dir(Self::default_dir())
    }
}

/// How the model artifact is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// safetensors checkpoint produced by the training pipeline
    #[default]
    Candle,
    /// Keras model exported to ONNX
    #[cfg(feature = "onnx")]
    Onnx,
}

impl Backend {
    /// Picks the backend from the model file extension.
    #[cfg_attr(not(feature = "onnx"), allow(unused_variables))]
    pub fn for_path(path: &Path) -> Self {
        #[cfg(feature = "onnx")]
        {
            if path.extension().and_then(|e| e.to_str()) == Some("onnx") {
                return Self::Onnx;
            }
        }
        Self::Candle
    }
}

/// Everything needed to construct an [`InferenceContext`](crate::InferenceContext).
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub paths: ArtifactPaths,
    pub max_len: usize,
    pub policy: SelectionPolicy,
    pub labels: LabelSchema,
    pub backend: Backend,
    pub device: Device,
    #[cfg(feature = "onnx")]
    pub runtime: crate::runtime::RuntimeConfig,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self::new(ArtifactPaths::default())
    }
}

impl InferenceConfig {
    pub fn new(paths: ArtifactPaths) -> Self {
        let backend = Backend::for_path(&paths.model);
        Self {
            paths,
            max_len: MAX_SEQUENCE_LENGTH,
            policy: SelectionPolicy::default(),
            labels: LabelSchema::goemotions(),
            backend,
            device: Device::Cpu,
            #[cfg(feature = "onnx")]
            runtime: crate::runtime::RuntimeConfig::default(),
        }
    }

    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_labels(mut self, labels: LabelSchema) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_paths_in_dir() {
        let paths = ArtifactPaths::in_dir("/tmp/models");
        assert!(paths.model.ends_with("birnn_model.safetensors"));
        assert!(paths.tokenizer.ends_with("tokenizer.json"));
    }

    #[test]
    fn test_default_dir_env_override() {
        env::set_var("EMOTIVE_ARTIFACTS", "/tmp/emotive-test-artifacts");
        let dir = ArtifactPaths::default_dir();
        env::remove_var("EMOTIVE_ARTIFACTS");
        assert_eq!(dir, PathBuf::from("/tmp/emotive-test-artifacts"));

        assert_eq!(ArtifactPaths::default_dir(), PathBuf::from(DEFAULT_ARTIFACTS_DIR));
    }

    #[test]
    fn test_inference_config_defaults() {
        let config = InferenceConfig::new(ArtifactPaths::in_dir("models"));
        assert_eq!(config.max_len, 100);
        assert_eq!(config.policy, SelectionPolicy::TopK(3));
        assert_eq!(config.labels.len(), 28);
        assert_eq!(config.backend, Backend::Candle);
    }

    #[test]
    fn test_backend_for_path() {
        assert_eq!(Backend::for_path(Path::new("m/birnn_model.safetensors")), Backend::Candle);
        #[cfg(feature = "onnx")]
        assert_eq!(Backend::for_path(Path::new("m/birnn_model.onnx")), Backend::Onnx);
        #[cfg(not(feature = "onnx"))]
        assert_eq!(Backend::for_path(Path::new("m/birnn_model.onnx")), Backend::Candle);
    }
}
