use std::error::Error;
use std::fs;

use emotive::dataset::load_data;
use emotive::utils::get_label_columns;
use emotive::{train_model, ClassifierError, ModelConfig, Stage, TrainingConfig};
use tempfile::tempdir;

#[test]
fn test_missing_dataset_names_the_path() {
    let err = load_data("no/such/file.csv").unwrap_err();
    assert!(matches!(err, ClassifierError::DataLoaderError { .. }));
    assert!(err.to_string().contains("no/such/file.csv"));
}

#[test]
fn test_no_numeric_columns() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.csv");
    fs::write(&path, "text,source\nhello,reddit\nbye,twitter\n").unwrap();

    let dataset = load_data(&path).unwrap();
    let err = get_label_columns(&dataset, "text").unwrap_err();
    assert!(matches!(err, ClassifierError::UtilsError { .. }));
}

#[test]
fn test_training_wraps_stage_errors() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.csv");
    fs::write(&path, "text,source\nhello,reddit\nbye,twitter\n").unwrap();

    let config = TrainingConfig {
        data_path: path,
        tokenizer_path: dir.path().join("tokenizer.json"),
        model_path: dir.path().join("model.safetensors"),
        ..TrainingConfig::default()
    };
    let err = train_model(&config).unwrap_err();

    assert_eq!(err.stage(), Stage::Training);
    assert_eq!(err.root_stage(), Stage::Utils);
    let source = err.source().unwrap().downcast_ref::<ClassifierError>().unwrap();
    assert!(matches!(source, ClassifierError::UtilsError { .. }));
}

#[test]
fn test_missing_text_column() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.csv");
    fs::write(&path, "body,joy\nhello,1\n").unwrap();

    let config = TrainingConfig {
        data_path: path,
        ..TrainingConfig::default()
    };
    let err = train_model(&config).unwrap_err();
    assert_eq!(err.root_stage(), Stage::Preprocessing);
}

#[test]
fn test_zero_vocab_size_fails_before_training() {
    let err = ModelConfig::new(0, 28).validate().unwrap_err();
    assert!(matches!(err, ClassifierError::ModelBuildError { .. }));
}
