use std::fs;
use std::path::Path;

use candle_core::Tensor;
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use log::{debug, info, warn};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::early_stopping::{EarlyStopping, EpochOutcome};
use super::metrics::{EpochMetrics, MetricCounts};
use super::{TrainingConfig, TrainingReport};
use crate::classifier::{binary_cross_entropy_with_logits, ModelConfig, ModelMetadata, TrainedModel};
use crate::dataset::load_data;
use crate::error::{ClassifierError, Stage, StageContext};
use crate::preprocessing::preprocess_dataset;
use crate::tokenizer::{fit_tokenizer, pad_sequences, PadConfig, Vocabulary};
use crate::utils::{build_labels, get_label_columns, resolve_label_columns, split_dataset};

/// Loads a CSV, normalizes its text column, fits a vocabulary and saves it.
///
/// # Arguments
/// * `data_path` - CSV with a header row
/// * `text_column` - Column holding the raw text
/// * `num_words` - Vocabulary cap, padding and OOV ids included
/// * `tokenizer_path` - Destination JSON file
pub fn fit_tokenizer_from_csv(
    data_path: impl AsRef<Path>,
    text_column: &str,
    num_words: usize,
    tokenizer_path: impl AsRef<Path>,
) -> Result<Vocabulary, ClassifierError> {
    let mut dataset = load_data(data_path)?;
    preprocess_dataset(&mut dataset, text_column)?;

    let texts = dataset.column(text_column).map(|c| c.values.as_slice()).unwrap_or_default();
    let vocabulary = fit_tokenizer(texts, num_words)?;
    vocabulary.save(tokenizer_path)?;
    Ok(vocabulary)
}

/// Runs the full training pipeline described by `config`.
///
/// The metadata sidecar is written before the first epoch. The best checkpoint
/// (lowest validation loss) is written to `config.model_path` as training progresses.
///
/// # Errors
/// * `TrainingError` for every failure, with the stage error that caused it as source
pub fn train_model(config: &TrainingConfig) -> Result<TrainingReport, ClassifierError> {
    run(config).map_err(|e| match e.stage() {
        Stage::Training => e,
        _ => e.wrap(Stage::Training, "Error while training model"),
    })
}

fn run(config: &TrainingConfig) -> Result<TrainingReport, ClassifierError> {
    config.validate()?;

    let mut dataset = load_data(&config.data_path)?;

    preprocess_dataset(&mut dataset, &config.text_column)?;

    let detected = get_label_columns(&dataset, &config.text_column)?;
    let label_columns = resolve_label_columns(&detected, &config.labels)?;
    let y = build_labels(&dataset, &label_columns)?;

    let vocabulary = Vocabulary::load(&config.tokenizer_path)?;
    let texts = dataset
        .column(&config.text_column)
        .map(|c| c.values.as_slice())
        .unwrap_or_default();
    let sequences = vocabulary.texts_to_sequences(texts);
    let x = pad_sequences(&sequences, &PadConfig::with_max_len(config.max_len))?;
    info!("Text tokenization and padding completed. X shape: {:?}", x.dim());

    let split = split_dataset(&x, &y, config.test_size, config.seed)?;

    let model_config = ModelConfig::new(vocabulary.vocab_size(), config.labels.len())
        .with_max_len(config.max_len)
        .with_embedding_dim(config.embedding_dim)
        .with_lstm_units(config.lstm_units)
        .with_dropout_rate(config.dropout_rate);
    let metadata = ModelMetadata::new(model_config, config.labels.clone(), vocabulary.fingerprint()?);
    let mut model = TrainedModel::new(metadata, config.device.clone())?;

    let params = ParamsAdamW {
        lr: config.learning_rate,
        weight_decay: 0.0,
        ..Default::default()
    };
    let mut optimizer = AdamW::new(model.varmap().all_vars(), params)
        .stage_context(Stage::Training, "Failed to create optimizer")?;

    start_checkpoint(&model, &config.model_path)?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut early_stopping = EarlyStopping::new(config.patience, config.restore_best_weights);
    let mut history = Vec::with_capacity(config.epochs);
    let mut stopped_early = false;

    for epoch in 1..=config.epochs {
        let (loss, train_counts) = train_epoch(
            &model,
            &mut optimizer,
            &split.x_train,
            &split.y_train,
            config.batch_size,
            &mut rng,
        )
        .stage_context(Stage::Training, format!("Optimisation failed in epoch {}", epoch))?;
        let (val_loss, val_counts) = evaluate(&model, &split.x_val, &split.y_val, config.batch_size)
            .stage_context(Stage::Training, format!("Validation failed in epoch {}", epoch))?;

        let metrics = EpochMetrics::new(epoch, loss, &train_counts, val_loss, &val_counts);
        info!(
            "Epoch {}/{} - loss: {:.4} - accuracy: {:.4} - precision: {:.4} - recall: {:.4} - val_loss: {:.4} - val_accuracy: {:.4} - val_precision: {:.4} - val_recall: {:.4}",
            epoch,
            config.epochs,
            metrics.loss,
            metrics.accuracy,
            metrics.precision,
            metrics.recall,
            metrics.val_loss,
            metrics.val_accuracy,
            metrics.val_precision,
            metrics.val_recall
        );
        history.push(metrics);

        match early_stopping.update(epoch, val_loss) {
            EpochOutcome::Improved => {
                model.save_weights(&config.model_path)?;
                info!("val_loss improved to {:.4}, checkpoint saved to {}", val_loss, config.model_path.display());
            }
            EpochOutcome::NoImprovement => {
                debug!("val_loss did not improve for {} epoch(s)", early_stopping.wait());
            }
            EpochOutcome::Stop => {
                info!("Early stopping after epoch {} (patience {})", epoch, config.patience);
                stopped_early = true;
                break;
            }
        }
    }

    match early_stopping.best_epoch() {
        Some(best) if early_stopping.restore_best_weights => {
            model.restore_weights(&config.model_path)?;
            debug!("Restored weights from epoch {}", best);
        }
        Some(_) => {}
        None => {
            warn!("Validation loss never improved; saving the final weights");
            model.save_weights(&config.model_path)?;
        }
    }

    info!(
        "Training completed successfully. Best model saved at {}",
        config.model_path.display()
    );

    Ok(TrainingReport {
        best_epoch: early_stopping.best_epoch(),
        best_val_loss: early_stopping.best_loss(),
        history,
        stopped_early,
        label_columns,
        train_samples: split.x_train.nrows(),
        val_samples: split.x_val.nrows(),
        model_path: config.model_path.clone(),
        tokenizer_path: config.tokenizer_path.clone(),
    })
}

/// Writes the metadata sidecar for a fresh run and removes weights left by a
/// previous one, so every checkpoint on disk matches its metadata.
fn start_checkpoint(model: &TrainedModel, model_path: &Path) -> Result<(), ClassifierError> {
    model.metadata().save(model_path)?;
    if model_path.exists() {
        fs::remove_file(model_path).stage_context(
            Stage::Training,
            format!("Failed to remove stale checkpoint {}", model_path.display()),
        )?;
        debug!("Removed stale checkpoint {}", model_path.display());
    }
    Ok(())
}

fn target_tensor(model: &TrainedModel, targets: &Array2<f32>) -> candle_core::Result<Tensor> {
    let data: Vec<f32> = targets.iter().copied().collect();
    Tensor::from_vec(data, targets.dim(), model.device())
}

/// One pass over the training rows in a freshly shuffled order.
///
/// Returns the sample-weighted mean loss and the metric counts.
fn train_epoch(
    model: &TrainedModel,
    optimizer: &mut AdamW,
    x: &Array2<u32>,
    y: &Array2<f32>,
    batch_size: usize,
    rng: &mut StdRng,
) -> candle_core::Result<(f32, MetricCounts)> {
    let mut order: Vec<usize> = (0..x.nrows()).collect();
    order.shuffle(rng);

    let mut total_loss = 0.0f32;
    let mut counts = MetricCounts::default();

    for batch in order.chunks(batch_size) {
        let xb = x.select(Axis(0), batch);
        let yb = y.select(Axis(0), batch);

        let input = model.input_tensor(&xb)?;
        let targets = target_tensor(model, &yb)?;
        let logits = model.model().forward_t(&input, true)?;
        let loss = binary_cross_entropy_with_logits(&logits, &targets)?;
        optimizer.backward_step(&loss)?;

        total_loss += loss.to_scalar::<f32>()? * batch.len() as f32;
        let probabilities = candle_nn::ops::sigmoid(&logits)?.flatten_all()?.to_vec1::<f32>()?;
        let expected: Vec<f32> = yb.iter().copied().collect();
        counts.update(&probabilities, &expected);
    }

    Ok((total_loss / x.nrows().max(1) as f32, counts))
}

/// Loss and metric counts without dropout or weight updates.
fn evaluate(
    model: &TrainedModel,
    x: &Array2<u32>,
    y: &Array2<f32>,
    batch_size: usize,
) -> candle_core::Result<(f32, MetricCounts)> {
    let mut total_loss = 0.0f32;
    let mut counts = MetricCounts::default();

    let rows: Vec<usize> = (0..x.nrows()).collect();
    for batch in rows.chunks(batch_size) {
        let xb = x.select(Axis(0), batch);
        let yb = y.select(Axis(0), batch);

        let input = model.input_tensor(&xb)?;
        let targets = target_tensor(model, &yb)?;
        let logits = model.model().forward_t(&input, false)?;
        let loss = binary_cross_entropy_with_logits(&logits, &targets)?;

        total_loss += loss.to_scalar::<f32>()? * batch.len() as f32;
        let probabilities = candle_nn::ops::sigmoid(&logits)?.flatten_all()?.to_vec1::<f32>()?;
        let expected: Vec<f32> = yb.iter().copied().collect();
        counts.update(&probabilities, &expected);
    }

    Ok((total_loss / x.nrows().max(1) as f32, counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelSchema;
    use candle_core::Device;

    fn model(labels: &[&str]) -> TrainedModel {
        let config = ModelConfig::new(10, labels.len())
            .with_max_len(4)
            .with_embedding_dim(4)
            .with_lstm_units(2);
        let schema = LabelSchema::new(labels.iter().copied()).unwrap();
        TrainedModel::new(ModelMetadata::new(config, schema, "abc123"), Device::Cpu).unwrap()
    }

    #[test]
    fn test_start_checkpoint_replaces_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved_models").join("model.safetensors");

        let previous = model(&["joy", "anger", "fear"]);
        previous.save(&path).unwrap();

        let current = model(&["joy", "anger"]);
        start_checkpoint(&current, &path).unwrap();

        assert!(!path.exists());
        assert_eq!(&ModelMetadata::load(&path).unwrap(), current.metadata());
    }

    #[test]
    fn test_start_checkpoint_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.safetensors");

        start_checkpoint(&model(&["joy"]), &path).unwrap();
        assert!(ModelMetadata::path_for(&path).exists());
    }
}
