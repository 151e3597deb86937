use std::fmt;

/// Boxed error used as the originating cause of a [`ClassifierError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Identifies the pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    DataLoader,
    Preprocessing,
    Tokenizer,
    ModelBuild,
    Training,
    Utils,
    Prediction,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DataLoader => "data loader",
            Self::Preprocessing => "preprocessing",
            Self::Tokenizer => "tokenizer",
            Self::ModelBuild => "model build",
            Self::Training => "training",
            Self::Utils => "utils",
            Self::Prediction => "prediction",
        };
        f.write_str(name)
    }
}

/// Represents the different types of errors that can occur in the emotion classifier.
///
/// Every variant carries a message and, when the failure was caused by another
/// error, that error as its [`source`](std::error::Error::source). Outer stages
/// wrap inner ones, so the full chain stays inspectable.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// The dataset file is missing or unreadable
    #[error("Data loader error: {message}")]
    DataLoaderError {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    /// Text normalization failed
    #[error("Preprocessing error: {message}")]
    PreprocessingError {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    /// Vocabulary fit, encode, pad or persistence failed
    #[error("Tokenizer error: {message}")]
    TokenizerError {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    /// The network could not be constructed or loaded
    #[error("Model build error: {message}")]
    ModelBuildError {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    /// Any failure during a training run
    #[error("Training error: {message}")]
    TrainingError {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    /// Label-column detection, label matrix or split failure
    #[error("Utils error: {message}")]
    UtilsError {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    /// Any failure while scoring text, including empty input
    #[error("Prediction error: {message}")]
    PredictionError {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl ClassifierError {
    /// Creates an error for `stage` without an underlying cause.
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self::build(stage, message.into(), None)
    }

    /// Creates an error for `stage` wrapping the originating cause.
    pub fn with_source(stage: Stage, message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::build(stage, message.into(), Some(source.into()))
    }

    fn build(stage: Stage, message: String, source: Option<BoxError>) -> Self {
        match stage {
            Stage::DataLoader => Self::DataLoaderError { message, source },
            Stage::Preprocessing => Self::PreprocessingError { message, source },
            Stage::Tokenizer => Self::TokenizerError { message, source },
            Stage::ModelBuild => Self::ModelBuildError { message, source },
            Stage::Training => Self::TrainingError { message, source },
            Stage::Utils => Self::UtilsError { message, source },
            Stage::Prediction => Self::PredictionError { message, source },
        }
    }

    /// The stage this error was raised in.
    pub fn stage(&self) -> Stage {
        match self {
            Self::DataLoaderError { .. } => Stage::DataLoader,
            Self::PreprocessingError { .. } => Stage::Preprocessing,
            Self::TokenizerError { .. } => Stage::Tokenizer,
            Self::ModelBuildError { .. } => Stage::ModelBuild,
            Self::TrainingError { .. } => Stage::Training,
            Self::UtilsError { .. } => Stage::Utils,
            Self::PredictionError { .. } => Stage::Prediction,
        }
    }

    /// The message attached at this level, without the cause chain.
    pub fn message(&self) -> &str {
        match self {
            Self::DataLoaderError { message, .. }
            | Self::PreprocessingError { message, .. }
            | Self::TokenizerError { message, .. }
            | Self::ModelBuildError { message, .. }
            | Self::TrainingError { message, .. }
            | Self::UtilsError { message, .. }
            | Self::PredictionError { message, .. } => message,
        }
    }

    /// Re-wraps this error as the cause of an error in an outer stage.
    pub fn wrap(self, stage: Stage, message: impl Into<String>) -> Self {
        Self::with_source(stage, message, self)
    }

    /// Walks the source chain down to the innermost stage error.
    pub fn root_stage(&self) -> Stage {
        let mut stage = self.stage();
        let mut current: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(self);
        while let Some(err) = current {
            if let Some(inner) = err.downcast_ref::<ClassifierError>() {
                stage = inner.stage();
            }
            current = err.source();
        }
        stage
    }
}

/// Converts foreign errors into a [`ClassifierError`] for a given stage.
pub trait StageContext<T> {
    fn stage_context(self, stage: Stage, message: impl Into<String>) -> Result<T, ClassifierError>;
}

impl<T, E> StageContext<T> for Result<T, E>
where
    E: Into<BoxError>,
{
    fn stage_context(self, stage: Stage, message: impl Into<String>) -> Result<T, ClassifierError> {
        self.map_err(|e| ClassifierError::with_source(stage, message, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn test_stage_round_trip() {
        let stages = [
            Stage::DataLoader,
            Stage::Preprocessing,
            Stage::Tokenizer,
            Stage::ModelBuild,
            Stage::Training,
            Stage::Utils,
            Stage::Prediction,
        ];
        for stage in stages {
            assert_eq!(ClassifierError::new(stage, "boom").stage(), stage);
        }
    }

    #[test]
    fn test_display_includes_stage_and_message() {
        let err = ClassifierError::new(Stage::Tokenizer, "Error while saving tokenizer");
        assert_eq!(err.to_string(), "Tokenizer error: Error while saving tokenizer");
        assert_eq!(err.message(), "Error while saving tokenizer");
    }

    #[test]
    fn test_source_is_preserved() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let result: Result<(), io::Error> = Err(io_err);
        let err = result.stage_context(Stage::DataLoader, "could not open").unwrap_err();

        let source = err.source().expect("source should be attached");
        assert_eq!(source.to_string(), "missing");
    }

    #[test]
    fn test_wrap_keeps_inner_stage() {
        let inner = ClassifierError::new(Stage::Tokenizer, "bad id");
        let outer = inner.wrap(Stage::Prediction, "Error during prediction");

        assert!(matches!(outer, ClassifierError::PredictionError { .. }));
        assert_eq!(outer.root_stage(), Stage::Tokenizer);
        let source = outer.source().unwrap();
        assert!(source.downcast_ref::<ClassifierError>().is_some());
    }
}
