//! On-disk form of a trained classifier.
//!
//! Weights live in a safetensors file written by [`VarMap::save`]. Next to it,
//! with the same stem and a `.json` extension, sits a [`ModelMetadata`] sidecar
//! describing the architecture, the label order, and the fingerprint of the
//! vocabulary the model was trained with.

use std::fs;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::birnn::BiRnnClassifier;
use super::config::ModelConfig;
use super::scorer::Scorer;
use crate::error::{ClassifierError, Stage, StageContext};
use crate::labels::LabelSchema;

pub const MODEL_FORMAT_VERSION: u32 = 1;
pub const MODEL_NAME: &str = "BiRNN_Emotion_Classifier";

/// Everything needed to rebuild a model before its weights are loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub format_version: u32,
    pub name: String,
    pub config: ModelConfig,
    pub labels: LabelSchema,
    /// [`Vocabulary::fingerprint`](crate::tokenizer::Vocabulary::fingerprint) at training time
    pub tokenizer_fingerprint: String,
}

impl ModelMetadata {
    pub fn new(config: ModelConfig, labels: LabelSchema, tokenizer_fingerprint: impl Into<String>) -> Self {
        Self {
            format_version: MODEL_FORMAT_VERSION,
            name: MODEL_NAME.to_string(),
            config,
            labels,
            tokenizer_fingerprint: tokenizer_fingerprint.into(),
        }
    }

    /// Sidecar location for a weights file.
    pub fn path_for(weights_path: &Path) -> PathBuf {
        weights_path.with_extension("json")
    }

    pub fn save(&self, weights_path: &Path) -> Result<(), ClassifierError> {
        let path = Self::path_for(weights_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .stage_context(Stage::ModelBuild, format!("Failed to create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_vec_pretty(self)
            .stage_context(Stage::ModelBuild, "Failed to serialize model metadata")?;
        fs::write(&path, json)
            .stage_context(Stage::ModelBuild, format!("Failed to write model metadata to {}", path.display()))
    }

    pub fn load(weights_path: &Path) -> Result<Self, ClassifierError> {
        let path = Self::path_for(weights_path);
        if !path.exists() {
            return Err(ClassifierError::new(
                Stage::ModelBuild,
                format!("Model metadata not found: {}", path.display()),
            ));
        }
        let bytes = fs::read(&path)
            .stage_context(Stage::ModelBuild, format!("Failed to read model metadata {}", path.display()))?;
        let metadata: Self = serde_json::from_slice(&bytes)
            .stage_context(Stage::ModelBuild, format!("Invalid model metadata {}", path.display()))?;

        if metadata.format_version != MODEL_FORMAT_VERSION {
            return Err(ClassifierError::new(
                Stage::ModelBuild,
                format!(
                    "Unsupported model format version {} (expected {})",
                    metadata.format_version, MODEL_FORMAT_VERSION
                ),
            ));
        }
        if metadata.labels.len() != metadata.config.num_classes {
            return Err(ClassifierError::new(
                Stage::ModelBuild,
                format!(
                    "Model metadata lists {} labels but the output layer has {} units",
                    metadata.labels.len(),
                    metadata.config.num_classes
                ),
            ));
        }
        Ok(metadata)
    }
}

/// A [`BiRnnClassifier`] together with the variables backing it.
pub struct TrainedModel {
    model: BiRnnClassifier,
    varmap: VarMap,
    metadata: ModelMetadata,
    device: Device,
}

impl std::fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedModel")
            .field("metadata", &self.metadata)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl TrainedModel {
    /// Builds a freshly initialized model.
    pub fn new(metadata: ModelMetadata, device: Device) -> Result<Self, ClassifierError> {
        if metadata.labels.len() != metadata.config.num_classes {
            return Err(ClassifierError::new(
                Stage::ModelBuild,
                format!(
                    "Label schema has {} labels but num_classes is {}",
                    metadata.labels.len(),
                    metadata.config.num_classes
                ),
            ));
        }
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = BiRnnClassifier::build(&metadata.config, vb)?;
        Ok(Self {
            model,
            varmap,
            metadata,
            device,
        })
    }

    /// Rebuilds the architecture from the metadata sidecar and loads the weights.
    ///
    /// # Errors
    /// * `ModelBuildError` if either file is missing or does not match the architecture
    pub fn load(weights_path: impl AsRef<Path>, device: Device) -> Result<Self, ClassifierError> {
        let weights_path = weights_path.as_ref();
        if !weights_path.exists() {
            return Err(ClassifierError::new(
                Stage::ModelBuild,
                format!("Model file not found: {}", weights_path.display()),
            ));
        }
        let metadata = ModelMetadata::load(weights_path)?;
        let mut model = Self::new(metadata, device)?;
        model.restore_weights(weights_path)?;
        info!("Model loaded from {}", weights_path.display());
        Ok(model)
    }

    /// Writes the weights and the metadata sidecar.
    pub fn save(&self, weights_path: impl AsRef<Path>) -> Result<(), ClassifierError> {
        let weights_path = weights_path.as_ref();
        self.save_weights(weights_path)?;
        self.metadata.save(weights_path)?;
        info!("Model saved to {}", weights_path.display());
        Ok(())
    }

    pub fn save_weights(&self, weights_path: &Path) -> Result<(), ClassifierError> {
        if let Some(parent) = weights_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .stage_context(Stage::ModelBuild, format!("Failed to create {}", parent.display()))?;
            }
        }
        self.varmap
            .save(weights_path)
            .stage_context(Stage::ModelBuild, format!("Failed to save weights to {}", weights_path.display()))?;
        debug!("Weights written to {}", weights_path.display());
        Ok(())
    }

    /// Overwrites the current weights in place with those stored at `weights_path`.
    pub fn restore_weights(&mut self, weights_path: &Path) -> Result<(), ClassifierError> {
        self.varmap
            .load(weights_path)
            .stage_context(Stage::ModelBuild, format!("Failed to load weights from {}", weights_path.display()))
    }

    pub fn model(&self) -> &BiRnnClassifier {
        &self.model
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Copies a padded id matrix onto the model device.
    pub fn input_tensor(&self, batch: &Array2<u32>) -> candle_core::Result<Tensor> {
        let data: Vec<u32> = batch.iter().copied().collect();
        Tensor::from_vec(data, batch.dim(), &self.device)
    }
}

impl Scorer for TrainedModel {
    fn score(&self, batch: &Array2<u32>) -> Result<Array2<f32>, ClassifierError> {
        let (rows, _) = batch.dim();
        let classes = self.num_classes();
        if rows == 0 {
            return Ok(Array2::zeros((0, classes)));
        }

        let input = self
            .input_tensor(batch)
            .stage_context(Stage::Prediction, "Failed to create input tensor")?;
        let flat = self
            .model
            .probabilities(&input)
            .and_then(|p| p.flatten_all())
            .and_then(|p| p.to_vec1::<f32>())
            .stage_context(Stage::Prediction, "Failed to run model")?;

        Array2::from_shape_vec((rows, classes), flat)
            .stage_context(Stage::Prediction, "Model output has an unexpected shape")
    }

    fn num_classes(&self) -> usize {
        self.metadata.config.num_classes
    }

    fn max_len(&self) -> Option<usize> {
        Some(self.metadata.config.max_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn metadata() -> ModelMetadata {
        let config = ModelConfig::new(10, 2)
            .with_max_len(4)
            .with_embedding_dim(4)
            .with_lstm_units(2);
        ModelMetadata::new(config, LabelSchema::new(["joy", "anger"]).unwrap(), "abc123")
    }

    #[test]
    fn test_sidecar_path() {
        let path = ModelMetadata::path_for(Path::new("saved_models/birnn_model.safetensors"));
        assert_eq!(path, PathBuf::from("saved_models/birnn_model.json"));
    }

    #[test]
    fn test_save_and_load_reproduces_scores() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("model.safetensors");

        let model = TrainedModel::new(metadata(), Device::Cpu).unwrap();
        model.save(&path).unwrap();

        let loaded = TrainedModel::load(&path, Device::Cpu).unwrap();
        assert_eq!(loaded.metadata(), model.metadata());

        let batch = Array2::from_shape_vec((2, 4), vec![2, 3, 0, 0, 4, 1, 5, 0]).unwrap();
        let a = model.score(&batch).unwrap();
        let b = loaded.score(&batch).unwrap();
        assert_eq!(a.dim(), (2, 2));
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_missing_weights_is_model_build_error() {
        let dir = tempdir().unwrap();
        let err = TrainedModel::load(dir.path().join("absent.safetensors"), Device::Cpu).unwrap_err();
        assert!(matches!(err, ClassifierError::ModelBuildError { .. }));
    }

    #[test]
    fn test_label_count_must_match_outputs() {
        let mut meta = metadata();
        meta.config.num_classes = 3;
        assert!(TrainedModel::new(meta, Device::Cpu).is_err());
    }

    #[test]
    fn test_empty_batch() {
        let model = TrainedModel::new(metadata(), Device::Cpu).unwrap();
        let scores = model.score(&Array2::zeros((0, 4))).unwrap();
        assert_eq!(scores.dim(), (0, 2));
    }
}
