use std::fmt;

use candle_core::{IndexOp, Tensor};
use candle_nn::{embedding, linear, lstm, Dropout, Embedding, LSTMConfig, Linear, Module, VarBuilder, LSTM, RNN};

use super::config::ModelConfig;
use crate::error::{ClassifierError, Stage, StageContext};

/// Embedding → bidirectional LSTM → dropout → dense sigmoid outputs.
///
/// Each direction keeps only its final hidden state; the two are concatenated
/// into a `2 * lstm_units` encoding. The output layer produces one logit per
/// label and labels are scored independently with a sigmoid (never a softmax),
/// so any number of emotions can be active at once.
pub struct BiRnnClassifier {
    embedding: Embedding,
    forward_lstm: LSTM,
    backward_lstm: LSTM,
    dropout: Dropout,
    output: Linear,
    config: ModelConfig,
}

impl fmt::Debug for BiRnnClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BiRnnClassifier")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BiRnnClassifier {
    /// Allocates (or looks up) every weight through `vb`.
    ///
    /// # Errors
    /// * `ModelBuildError` if the config is invalid or a layer cannot be created
    pub fn build(config: &ModelConfig, vb: VarBuilder) -> Result<Self, ClassifierError> {
        config.validate()?;

        let embedding = embedding(config.vocab_size, config.embedding_dim, vb.pp("embedding_layer"))
            .stage_context(Stage::ModelBuild, "Failed to create embedding layer")?;

        let bi_lstm = vb.pp("bi_lstm_layer");
        let forward_lstm = lstm(
            config.embedding_dim,
            config.lstm_units,
            LSTMConfig::default(),
            bi_lstm.pp("forward"),
        )
        .stage_context(Stage::ModelBuild, "Failed to create forward LSTM")?;
        let backward_lstm = lstm(
            config.embedding_dim,
            config.lstm_units,
            LSTMConfig::default(),
            bi_lstm.pp("backward"),
        )
        .stage_context(Stage::ModelBuild, "Failed to create backward LSTM")?;

        let output = linear(config.encoded_dim(), config.num_classes, vb.pp("output_layer"))
            .stage_context(Stage::ModelBuild, "Failed to create output layer")?;

        log::info!(
            "Bidirectional RNN model built (vocab {}, embedding {}, units {}, classes {})",
            config.vocab_size,
            config.embedding_dim,
            config.lstm_units,
            config.num_classes
        );

        Ok(Self {
            embedding,
            forward_lstm,
            backward_lstm,
            dropout: Dropout::new(config.dropout_rate),
            output,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Final hidden state after running `lstm` over `steps` of `embedded`.
    fn final_state(
        lstm: &LSTM,
        embedded: &Tensor,
        steps: impl Iterator<Item = usize>,
    ) -> candle_core::Result<Tensor> {
        let batch = embedded.dim(0)?;
        let mut state = lstm.zero_state(batch)?;
        for t in steps {
            let input = embedded.i((.., t, ..))?.contiguous()?;
            state = lstm.step(&input, &state)?;
        }
        Ok(state.h().clone())
    }

    /// Logits of shape `(batch, num_classes)` for `input_ids` of shape `(batch, seq_len)`.
    ///
    /// Dropout is only active when `train` is true.
    pub fn forward_t(&self, input_ids: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let embedded = self.embedding.forward(input_ids)?;
        let seq_len = embedded.dim(1)?;

        let forward = Self::final_state(&self.forward_lstm, &embedded, 0..seq_len)?;
        let backward = Self::final_state(&self.backward_lstm, &embedded, (0..seq_len).rev())?;

        let encoded = Tensor::cat(&[&forward, &backward], 1)?;
        let encoded = self.dropout.forward(&encoded, train)?;
        self.output.forward(&encoded)
    }

    /// Independent per-label probabilities in `[0, 1]`.
    pub fn probabilities(&self, input_ids: &Tensor) -> candle_core::Result<Tensor> {
        let logits = self.forward_t(input_ids, false)?;
        candle_nn::ops::sigmoid(&logits)
    }
}

/// Binary cross-entropy on logits, averaged over every label output.
///
/// Uses `max(x, 0) - x * y + ln(1 + e^-|x|)`, which stays finite for large logits.
pub fn binary_cross_entropy_with_logits(logits: &Tensor, targets: &Tensor) -> candle_core::Result<Tensor> {
    let positive = logits.relu()?;
    let product = (logits * targets)?;
    let soft = logits.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    ((positive - product)? + soft)?.mean_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn tiny_config() -> ModelConfig {
        ModelConfig::new(12, 3)
            .with_max_len(5)
            .with_embedding_dim(4)
            .with_lstm_units(3)
    }

    #[test]
    fn test_output_shape_and_range() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = BiRnnClassifier::build(&tiny_config(), vb).unwrap();

        let ids = Tensor::from_vec(vec![2u32, 3, 4, 0, 0, 5, 1, 0, 0, 0], (2, 5), &device).unwrap();
        let probs = model.probabilities(&ids).unwrap();
        assert_eq!(probs.dims(), &[2, 3]);

        for row in probs.to_vec2::<f32>().unwrap() {
            for p in row {
                assert!((0.0..=1.0).contains(&p));
            }
        }
    }

    #[test]
    fn test_build_rejects_zero_vocab() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let config = ModelConfig { vocab_size: 0, ..tiny_config() };

        let err = BiRnnClassifier::build(&config, vb).unwrap_err();
        assert!(matches!(err, ClassifierError::ModelBuildError { .. }));
        assert!(varmap.all_vars().is_empty());
    }

    #[test]
    fn test_bce_matches_closed_form() {
        let device = Device::Cpu;
        let logits = Tensor::new(&[[0.0f32, 2.0], [-3.0, 40.0]], &device).unwrap();
        let targets = Tensor::new(&[[1.0f32, 0.0], [0.0, 1.0]], &device).unwrap();
        let loss = binary_cross_entropy_with_logits(&logits, &targets)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();

        let expected = [
            (2.0f32).ln(),
            2.0 + (1.0 + (-2.0f32).exp()).ln(),
            (1.0 + (-3.0f32).exp()).ln(),
            (1.0 + (-40.0f32).exp()).ln(),
        ]
        .iter()
        .sum::<f32>()
            / 4.0;
        assert!((loss - expected).abs() < 1e-5);
        assert!(loss.is_finite());
    }
}
