//! The bidirectional LSTM emotion model and the scorers that run it.

mod artifact;
mod birnn;
mod config;
#[cfg(feature = "onnx")]
mod onnx;
mod scorer;

pub use artifact::{ModelMetadata, TrainedModel, MODEL_FORMAT_VERSION, MODEL_NAME};
pub use birnn::{binary_cross_entropy_with_logits, BiRnnClassifier};
pub use config::{ModelConfig, DEFAULT_DROPOUT_RATE, DEFAULT_EMBEDDING_DIM, DEFAULT_LSTM_UNITS};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxClassifier, OnnxInputType};
pub use scorer::Scorer;
