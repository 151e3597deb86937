//! Offline training pipeline: CSV in, safetensors checkpoint and metadata out.

mod early_stopping;
mod metrics;
mod trainer;

use std::path::PathBuf;

use candle_core::Device;
use serde::Serialize;

use crate::classifier::{DEFAULT_DROPOUT_RATE, DEFAULT_EMBEDDING_DIM, DEFAULT_LSTM_UNITS};
use crate::config::{ArtifactPaths, DEFAULT_DATA_PATH, DEFAULT_TEXT_COLUMN, MAX_SEQUENCE_LENGTH};
use crate::error::{ClassifierError, Stage};
use crate::labels::LabelSchema;
use crate::utils::DEFAULT_SPLIT_SEED;

pub use early_stopping::{EarlyStopping, EpochOutcome};
pub use metrics::{EpochMetrics, MetricCounts, METRIC_THRESHOLD};
pub use trainer::{fit_tokenizer_from_csv, train_model};

/// Settings for [`train_model`].
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub data_path: PathBuf,
    pub text_column: String,
    /// Pre-fitted vocabulary, see [`fit_tokenizer_from_csv`]
    pub tokenizer_path: PathBuf,
    /// Where the best checkpoint is written; metadata goes next to it
    pub model_path: PathBuf,
    pub labels: LabelSchema,
    pub max_len: usize,
    pub embedding_dim: usize,
    pub lstm_units: usize,
    pub dropout_rate: f32,
    pub batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub test_size: f64,
    pub seed: u64,
    pub patience: usize,
    pub restore_best_weights: bool,
    pub device: Device,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let paths = ArtifactPaths::default();
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            text_column: DEFAULT_TEXT_COLUMN.to_string(),
            tokenizer_path: paths.tokenizer,
            model_path: paths.model,
            labels: LabelSchema::goemotions(),
            max_len: MAX_SEQUENCE_LENGTH,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            lstm_units: DEFAULT_LSTM_UNITS,
            dropout_rate: DEFAULT_DROPOUT_RATE,
            batch_size: 64,
            epochs: 10,
            learning_rate: 1e-3,
            test_size: 0.2,
            seed: DEFAULT_SPLIT_SEED,
            patience: 3,
            restore_best_weights: true,
            device: Device::Cpu,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), ClassifierError> {
        let problem = if self.batch_size == 0 {
            Some("batch_size must be greater than zero".to_string())
        } else if self.epochs == 0 {
            Some("epochs must be greater than zero".to_string())
        } else if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            Some(format!("learning_rate must be positive, got {}", self.learning_rate))
        } else if self.text_column.trim().is_empty() {
            Some("text_column cannot be empty".to_string())
        } else {
            None
        };

        match problem {
            Some(message) => Err(ClassifierError::new(Stage::Training, message)),
            None => Ok(()),
        }
    }
}

/// Outcome of a completed training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub history: Vec<EpochMetrics>,
    /// 1-based epoch whose weights were checkpointed
    pub best_epoch: Option<usize>,
    pub best_val_loss: Option<f32>,
    pub stopped_early: bool,
    pub label_columns: Vec<String>,
    pub train_samples: usize,
    pub val_samples: usize,
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
}

impl TrainingReport {
    pub fn epochs_run(&self) -> usize {
        self.history.len()
    }

    pub fn best_metrics(&self) -> Option<&EpochMetrics> {
        let best = self.best_epoch?;
        self.history.iter().find(|m| m.epoch == best)
    }
}
