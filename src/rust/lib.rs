//! Multi-label emotion classification over the 28 GoEmotions categories.
//!
//! Text is normalized, encoded with a frequency-ranked vocabulary, padded to a
//! fixed length and scored by a bidirectional LSTM with one independent sigmoid
//! per emotion. Any number of emotions can be present at once; a
//! [`SelectionPolicy`] decides which ones are reported.
//!
//! # Basic Usage
//!
//! Load the artifacts written by `emotive train` and predict:
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use emotive::{ArtifactPaths, InferenceConfig, InferenceContext};
//!
//! let ctx = InferenceContext::load(&InferenceConfig::new(ArtifactPaths::in_dir("saved_models")))?;
//! for emotion in ctx.predict("I absolutely love this, thank you!!!")?.iter() {
//!     println!("{}: {:.2}", emotion.label, emotion.score);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Custom Scorers
//!
//! Anything implementing [`Scorer`] can back an [`InferenceContext`]:
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use emotive::{ClassifierError, InferenceContext, LabelSchema, Scorer, SelectionPolicy};
//! use emotive::tokenizer::Vocabulary;
//! use ndarray::Array2;
//!
//! struct Constant;
//!
//! impl Scorer for Constant {
//!     fn score(&self, batch: &Array2<u32>) -> Result<Array2<f32>, ClassifierError> {
//!         Ok(Array2::from_shape_fn((batch.nrows(), 2), |(_, j)| if j == 0 { 0.8 } else { 0.1 }))
//!     }
//!
//!     fn num_classes(&self) -> usize {
//!         2
//!     }
//! }
//!
//! let vocabulary = Vocabulary::fit(["thank you so much"], 100, "<OOV>")?;
//! let ctx = InferenceContext::new(
//!     vocabulary,
//!     Box::new(Constant),
//!     LabelSchema::new(["gratitude", "anger"])?,
//!     100,
//!     SelectionPolicy::Threshold(0.5),
//! )?;
//!
//! assert_eq!(ctx.predict("Thank you!")?.labels(), vec!["gratitude"]);
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod inference;
pub mod labels;
pub mod preprocessing;
#[cfg(feature = "onnx")]
mod runtime;
pub mod tokenizer;
pub mod training;
pub mod utils;
pub mod web;

pub use classifier::{ModelConfig, ModelMetadata, Scorer, TrainedModel};
pub use config::{ArtifactPaths, Backend, InferenceConfig};
pub use error::{ClassifierError, Stage, StageContext};
pub use inference::InferenceContext;
pub use labels::{EmotionResult, EmotionScore, LabelSchema, SelectionPolicy, GOEMOTIONS_LABELS};
#[cfg(feature = "onnx")]
pub use runtime::{create_session_builder, OptimizationLevel, RuntimeConfig};
pub use training::{train_model, TrainingConfig, TrainingReport};

pub fn init_logger() {
    env_logger::init();
}
