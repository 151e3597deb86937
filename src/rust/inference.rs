use std::fmt;

use log::{debug, info, warn};
use ndarray::Array2;

use crate::classifier::{Scorer, TrainedModel};
use crate::config::{Backend, InferenceConfig};
use crate::error::{ClassifierError, Stage};
use crate::labels::{select, EmotionResult, LabelSchema, SelectionPolicy};
use crate::preprocessing::normalize;
use crate::tokenizer::{pad, Vocabulary};

/// A loaded model and vocabulary, ready to score text.
///
/// The context is immutable after construction and `predict` only needs `&self`.
///
/// # Thread Safety
///
/// `InferenceContext` is `Send + Sync`; share it across threads with `Arc`:
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use emotive::{InferenceConfig, InferenceContext};
/// use std::sync::Arc;
/// use std::thread;
///
/// let ctx = Arc::new(InferenceContext::load(&InferenceConfig::default())?);
/// let handles: Vec<_> = (0..3)
///     .map(|_| {
///         let ctx = Arc::clone(&ctx);
///         thread::spawn(move || ctx.predict("thanks so much").map(|r| r.len()))
///     })
///     .collect();
/// for handle in handles {
///     handle.join().unwrap()?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct InferenceContext {
    vocabulary: Vocabulary,
    scorer: Box<dyn Scorer>,
    labels: LabelSchema,
    max_len: usize,
    policy: SelectionPolicy,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<InferenceContext>();
    }
};

impl fmt::Debug for InferenceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceContext")
            .field("vocab_size", &self.vocabulary.vocab_size())
            .field("labels", &self.labels.len())
            .field("max_len", &self.max_len)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn as_prediction_error(err: ClassifierError, message: &str) -> ClassifierError {
    match err.stage() {
        Stage::Prediction => err,
        _ => err.wrap(Stage::Prediction, message),
    }
}

impl InferenceContext {
    /// Loads the vocabulary and model named by `config`.
    ///
    /// For the candle backend the model metadata must list the same labels as
    /// `config.labels` and carry the fingerprint of the loaded vocabulary.
    ///
    /// # Errors
    /// * `PredictionError` wrapping the tokenizer or model failure
    pub fn load(config: &InferenceConfig) -> Result<Self, ClassifierError> {
        Self::load_inner(config).map_err(|e| as_prediction_error(e, "Error loading model or tokenizer"))
    }

    fn load_inner(config: &InferenceConfig) -> Result<Self, ClassifierError> {
        let vocabulary = Vocabulary::load(&config.paths.tokenizer)?;

        let (scorer, max_len): (Box<dyn Scorer>, usize) = match config.backend {
            Backend::Candle => {
                let model = TrainedModel::load(&config.paths.model, config.device.clone())?;
                let metadata = model.metadata();

                if metadata.labels != config.labels {
                    return Err(ClassifierError::new(
                        Stage::ModelBuild,
                        format!(
                            "Model was trained with a different label schema ({} labels, expected {})",
                            metadata.labels.len(),
                            config.labels.len()
                        ),
                    ));
                }
                if metadata.tokenizer_fingerprint != vocabulary.fingerprint()? {
                    return Err(ClassifierError::new(
                        Stage::Tokenizer,
                        format!(
                            "Tokenizer {} is not the one the model was trained with",
                            config.paths.tokenizer.display()
                        ),
                    ));
                }

                let trained_len = metadata.config.max_len;
                if trained_len != config.max_len {
                    warn!(
                        "Model was trained on sequences of length {}, ignoring configured max_len {}",
                        trained_len, config.max_len
                    );
                }
                let scorer: Box<dyn Scorer> = Box::new(model);
                (scorer, trained_len)
            }
            #[cfg(feature = "onnx")]
            Backend::Onnx => {
                let model = crate::classifier::OnnxClassifier::from_file(
                    &config.paths.model,
                    config.labels.len(),
                    crate::classifier::OnnxInputType::default(),
                    &config.runtime,
                )?;
                let scorer: Box<dyn Scorer> = Box::new(model);
                (scorer, config.max_len)
            }
        };

        let ctx = Self::new(vocabulary, scorer, config.labels.clone(), max_len, config.policy)?;
        info!(
            "Inference context ready (model {}, tokenizer {})",
            config.paths.model.display(),
            config.paths.tokenizer.display()
        );
        Ok(ctx)
    }

    /// Assembles a context from parts, for callers that bring their own [`Scorer`].
    ///
    /// # Errors
    /// * `PredictionError` if the scorer width differs from the label count or
    ///   `max_len` is zero
    pub fn new(
        vocabulary: Vocabulary,
        scorer: Box<dyn Scorer>,
        labels: LabelSchema,
        max_len: usize,
        policy: SelectionPolicy,
    ) -> Result<Self, ClassifierError> {
        if scorer.num_classes() != labels.len() {
            return Err(ClassifierError::new(
                Stage::Prediction,
                format!(
                    "Model scores {} labels but the label schema has {}",
                    scorer.num_classes(),
                    labels.len()
                ),
            ));
        }
        if max_len == 0 {
            return Err(ClassifierError::new(Stage::Prediction, "max_len must be greater than zero"));
        }
        Ok(Self {
            vocabulary,
            scorer,
            labels,
            max_len,
            policy,
        })
    }

    pub fn labels(&self) -> &LabelSchema {
        &self.labels
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Emotions for `text` under the configured policy.
    pub fn predict(&self, text: &str) -> Result<EmotionResult, ClassifierError> {
        self.predict_with(text, self.policy)
    }

    /// Emotions for `text` under an explicit policy.
    pub fn predict_with(&self, text: &str, policy: SelectionPolicy) -> Result<EmotionResult, ClassifierError> {
        let scores = self.scores(text)?;
        select(&scores, &self.labels, policy).map_err(|e| as_prediction_error(e, "Error during prediction"))
    }

    /// One probability per schema label, in schema order.
    ///
    /// # Errors
    /// * `PredictionError("Empty input text")` for empty or whitespace-only input
    /// * `PredictionError` wrapping any normalization, tokenization or model failure
    pub fn scores(&self, text: &str) -> Result<Vec<f32>, ClassifierError> {
        self.scores_inner(text)
            .map_err(|e| as_prediction_error(e, "Error during prediction"))
    }

    fn scores_inner(&self, text: &str) -> Result<Vec<f32>, ClassifierError> {
        if text.trim().is_empty() {
            return Err(ClassifierError::new(Stage::Prediction, "Empty input text"));
        }

        let cleaned = normalize(text)?;
        let sequence = self.vocabulary.encode(&cleaned);
        let padded = pad(&sequence, self.max_len)?;
        debug!("Encoded {} tokens for prediction", sequence.len());

        let batch = Array2::from_shape_vec((1, self.max_len), padded).map_err(|e| {
            ClassifierError::with_source(Stage::Prediction, "Failed to build input batch", e)
        })?;
        let probabilities = self.scorer.score(&batch)?;

        if probabilities.dim() != (1, self.labels.len()) {
            return Err(ClassifierError::new(
                Stage::Prediction,
                format!(
                    "Model returned shape {:?}, expected (1, {})",
                    probabilities.dim(),
                    self.labels.len()
                ),
            ));
        }
        Ok(probabilities.row(0).to_vec())
    }
}
