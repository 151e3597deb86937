use serde::{Deserialize, Serialize};

use crate::config::MAX_SEQUENCE_LENGTH;
use crate::error::{ClassifierError, Stage};

pub const DEFAULT_EMBEDDING_DIM: usize = 128;
pub const DEFAULT_LSTM_UNITS: usize = 128;
pub const DEFAULT_DROPOUT_RATE: f32 = 0.3;

/// Shape and regularization settings of the bidirectional LSTM classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Embedding input size, padding id included
    pub vocab_size: usize,
    /// Padded sequence length the model consumes
    pub max_len: usize,
    pub embedding_dim: usize,
    /// Hidden units per direction
    pub lstm_units: usize,
    /// Applied to the encoder output during training only
    pub dropout_rate: f32,
    /// One independent sigmoid output per label
    pub num_classes: usize,
}

impl ModelConfig {
    /// Config with default layer sizes for the given vocabulary and label count.
    pub fn new(vocab_size: usize, num_classes: usize) -> Self {
        Self {
            vocab_size,
            max_len: MAX_SEQUENCE_LENGTH,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            lstm_units: DEFAULT_LSTM_UNITS,
            dropout_rate: DEFAULT_DROPOUT_RATE,
            num_classes,
        }
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn with_embedding_dim(mut self, embedding_dim: usize) -> Self {
        self.embedding_dim = embedding_dim;
        self
    }

    pub fn with_lstm_units(mut self, lstm_units: usize) -> Self {
        self.lstm_units = lstm_units;
        self
    }

    pub fn with_dropout_rate(mut self, dropout_rate: f32) -> Self {
        self.dropout_rate = dropout_rate;
        self
    }

    /// Width of the concatenated forward/backward encoder state.
    pub fn encoded_dim(&self) -> usize {
        self.lstm_units * 2
    }

    /// Rejects shapes that cannot be built, before any weights are allocated.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        let checks = [
            (self.vocab_size, "vocab_size"),
            (self.max_len, "max_len"),
            (self.embedding_dim, "embedding_dim"),
            (self.lstm_units, "lstm_units"),
            (self.num_classes, "num_classes"),
        ];
        if let Some((_, name)) = checks.iter().find(|(value, _)| *value == 0) {
            return Err(ClassifierError::new(
                Stage::ModelBuild,
                format!("Error building BiRNN model: {} must be greater than zero", name),
            ));
        }
        if self.vocab_size < 2 {
            return Err(ClassifierError::new(
                Stage::ModelBuild,
                "Error building BiRNN model: vocab_size must cover padding and at least one token",
            ));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(ClassifierError::new(
                Stage::ModelBuild,
                format!("Error building BiRNN model: dropout_rate must be in [0, 1), got {}", self.dropout_rate),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ModelConfig::new(500, 28);
        assert_eq!(config.max_len, 100);
        assert_eq!(config.embedding_dim, 128);
        assert_eq!(config.lstm_units, 128);
        assert_eq!(config.encoded_dim(), 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_vocab_fails_fast() {
        let err = ModelConfig::new(0, 28).validate().unwrap_err();
        assert!(matches!(err, ClassifierError::ModelBuildError { .. }));
        assert!(err.to_string().contains("vocab_size"));
    }

    #[test]
    fn test_invalid_dropout() {
        assert!(ModelConfig::new(10, 2).with_dropout_rate(1.0).validate().is_err());
        assert!(ModelConfig::new(10, 2).with_dropout_rate(-0.1).validate().is_err());
        assert!(ModelConfig::new(10, 2).with_dropout_rate(0.0).validate().is_ok());
    }
}
