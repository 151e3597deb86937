use std::collections::HashMap;
use std::path::Path;

use log::info;
use ndarray::{Array2, Ix2};
use ort::session::Session;
use ort::value::{DynValue, Tensor};

use super::scorer::Scorer;
use crate::error::{ClassifierError, Stage, StageContext};
use crate::runtime::{create_session_builder, RuntimeConfig};

/// Element type of the exported model's single input.
///
/// Keras exports usually declare `float32` ids; other exporters use `int64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnnxInputType {
    #[default]
    Float32,
    Int64,
}

/// Scorer backed by an exported ONNX graph taking `[batch, max_len]` ids
/// and returning `[batch, num_classes]` sigmoid outputs.
pub struct OnnxClassifier {
    session: Session,
    input_name: String,
    input_type: OnnxInputType,
    num_classes: usize,
}

impl OnnxClassifier {
    /// Loads and validates an ONNX model.
    ///
    /// # Arguments
    /// * `model_path` - Path to the `.onnx` file
    /// * `num_classes` - Expected width of the output
    /// * `input_type` - Element type the graph expects for token ids
    /// * `runtime` - Threading and optimization settings
    ///
    /// # Returns
    /// * `Result<Self, ClassifierError>` - The scorer, or `ModelBuildError` if
    ///   the file is missing, cannot be loaded, or has no inputs or outputs
    pub fn from_file(
        model_path: impl AsRef<Path>,
        num_classes: usize,
        input_type: OnnxInputType,
        runtime: &RuntimeConfig,
    ) -> Result<Self, ClassifierError> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(ClassifierError::new(
                Stage::ModelBuild,
                format!("Model file not found: {}", model_path.display()),
            ));
        }

        let session = create_session_builder(runtime)
            .stage_context(Stage::ModelBuild, "Failed to create session builder")?
            .commit_from_file(model_path)
            .stage_context(Stage::ModelBuild, format!("Failed to load model {}", model_path.display()))?;

        Self::validate_model(&session)?;
        let input_name = session.inputs[0].name.clone();
        info!("ONNX model loaded from {} (input '{}')", model_path.display(), input_name);

        Ok(Self {
            session,
            input_name,
            input_type,
            num_classes,
        })
    }

    fn validate_model(session: &Session) -> Result<(), ClassifierError> {
        if session.inputs.len() != 1 {
            return Err(ClassifierError::new(
                Stage::ModelBuild,
                format!("Model must have exactly 1 input (token ids), found {}", session.inputs.len()),
            ));
        }
        if session.outputs.is_empty() {
            return Err(ClassifierError::new(
                Stage::ModelBuild,
                "Model must have at least 1 output for label probabilities",
            ));
        }
        Ok(())
    }

    fn input_value(&self, batch: &Array2<u32>) -> Result<DynValue, ClassifierError> {
        let value = match self.input_type {
            OnnxInputType::Float32 => {
                let ids = batch.mapv(|id| id as f32).into_dyn();
                let ids = ids.as_standard_layout();
                Tensor::from_array(&ids)
                    .stage_context(Stage::Prediction, "Failed to create input tensor")?
                    .into_dyn()
            }
            OnnxInputType::Int64 => {
                let ids = batch.mapv(i64::from).into_dyn();
                let ids = ids.as_standard_layout();
                Tensor::from_array(&ids)
                    .stage_context(Stage::Prediction, "Failed to create input tensor")?
                    .into_dyn()
            }
        };
        Ok(value)
    }
}

impl Scorer for OnnxClassifier {
    fn score(&self, batch: &Array2<u32>) -> Result<Array2<f32>, ClassifierError> {
        let mut inputs = HashMap::new();
        inputs.insert(self.input_name.as_str(), self.input_value(batch)?);

        let outputs = self
            .session
            .run(inputs)
            .stage_context(Stage::Prediction, "Failed to run model")?;
        let probabilities = outputs[0]
            .try_extract_tensor::<f32>()
            .stage_context(Stage::Prediction, "Failed to extract output tensor")?
            .into_dimensionality::<Ix2>()
            .stage_context(Stage::Prediction, "Model output must be two-dimensional")?
            .to_owned();

        if probabilities.ncols() != self.num_classes {
            return Err(ClassifierError::new(
                Stage::Prediction,
                format!(
                    "Model returned {} scores per row, expected {}",
                    probabilities.ncols(),
                    self.num_classes
                ),
            ));
        }
        Ok(probabilities)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}
