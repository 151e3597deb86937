use log::{info, warn};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::dataset::Dataset;
use crate::error::{ClassifierError, Stage, StageContext};
use crate::labels::LabelSchema;

/// Seed used for the train/validation split unless configured otherwise.
pub const DEFAULT_SPLIT_SEED: u64 = 42;

/// Returns every numeric column other than `text_column`, in file order.
///
/// # Errors
/// * `UtilsError` if no numeric label column exists
pub fn get_label_columns(dataset: &Dataset, text_column: &str) -> Result<Vec<String>, ClassifierError> {
    let label_columns: Vec<String> = dataset
        .columns()
        .iter()
        .filter(|c| c.name != text_column && c.is_numeric())
        .map(|c| c.name.clone())
        .collect();

    if label_columns.is_empty() {
        return Err(ClassifierError::new(
            Stage::Utils,
            "Error detecting label columns: no numeric label columns found",
        ));
    }

    info!("Detected label columns: {:?}", label_columns);
    Ok(label_columns)
}

/// Checks detected label columns against the schema and returns them in schema order.
///
/// Extra numeric columns are ignored with a warning; a schema label without a
/// matching column is an error.
pub fn resolve_label_columns(detected: &[String], schema: &LabelSchema) -> Result<Vec<String>, ClassifierError> {
    let missing: Vec<&str> = schema
        .names()
        .iter()
        .filter(|name| !detected.contains(*name))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(ClassifierError::new(
            Stage::Utils,
            format!(
                "Dataset is missing {} of {} schema label columns: {}",
                missing.len(),
                schema.len(),
                missing.join(", ")
            ),
        ));
    }

    let extra: Vec<&str> = detected
        .iter()
        .filter(|name| schema.index_of(name).is_none())
        .map(String::as_str)
        .collect();
    if !extra.is_empty() {
        warn!("Ignoring numeric columns outside the label schema: {}", extra.join(", "));
    }

    Ok(schema.names().to_vec())
}

/// Builds the multi-hot label matrix, one row per sample and one column per label.
pub fn build_labels(dataset: &Dataset, label_columns: &[String]) -> Result<Array2<f32>, ClassifierError> {
    let rows = dataset.len();
    let mut labels = Array2::<f32>::zeros((rows, label_columns.len()));

    for (j, name) in label_columns.iter().enumerate() {
        let column = dataset
            .column(name)
            .ok_or_else(|| ClassifierError::new(Stage::Utils, format!("Label column '{}' not found", name)))?;
        for (i, raw) in column.values.iter().enumerate() {
            let value = raw.trim().parse::<f32>().stage_context(
                Stage::Utils,
                format!("Non-numeric value '{}' in label column '{}' (row {})", raw, name, i + 1),
            )?;
            labels[[i, j]] = value;
        }
    }

    info!("Labels built. Number of classes: {}", label_columns.len());
    Ok(labels)
}

/// Train and validation partitions of a padded feature matrix and its labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub x_train: Array2<u32>,
    pub x_val: Array2<u32>,
    pub y_train: Array2<f32>,
    pub y_val: Array2<f32>,
}

/// Shuffles rows with a seeded RNG and holds out `ceil(test_size * n)` of them.
///
/// # Errors
/// * `UtilsError` if `x` and `y` disagree on the number of samples, `test_size`
///   is outside `(0, 1)`, or either partition would be empty
pub fn split_dataset(
    x: &Array2<u32>,
    y: &Array2<f32>,
    test_size: f64,
    seed: u64,
) -> Result<Split, ClassifierError> {
    let n = x.nrows();
    if n != y.nrows() {
        return Err(ClassifierError::new(
            Stage::Utils,
            format!("Number of samples in X ({}) and y ({}) must match", n, y.nrows()),
        ));
    }
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(ClassifierError::new(
            Stage::Utils,
            format!("test_size must be in (0, 1), got {}", test_size),
        ));
    }

    let n_val = (test_size * n as f64).ceil() as usize;
    if n_val == 0 || n_val >= n {
        return Err(ClassifierError::new(
            Stage::Utils,
            format!("Cannot split {} samples with test_size {}", n, test_size),
        ));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let (val_idx, train_idx) = indices.split_at(n_val);

    let split = Split {
        x_train: x.select(Axis(0), train_idx),
        x_val: x.select(Axis(0), val_idx),
        y_train: y.select(Axis(0), train_idx),
        y_val: y.select(Axis(0), val_idx),
    };
    info!(
        "Data split into train ({}) and validation ({}) sets",
        split.x_train.nrows(),
        split.x_val.nrows()
    );
    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn dataset() -> Dataset {
        Dataset::from_columns(vec![
            ("id".into(), vec!["a1".into(), "b2".into()]),
            ("text".into(), vec!["yay".into(), "ugh".into()]),
            ("joy".into(), vec!["1".into(), "0".into()]),
            ("anger".into(), vec!["0".into(), "1".into()]),
        ])
        .unwrap()
    }

    #[test]
    fn test_detects_numeric_columns() {
        assert_eq!(get_label_columns(&dataset(), "text").unwrap(), vec!["joy", "anger"]);
    }

    #[test]
    fn test_no_numeric_columns_is_utils_error() {
        let ds = Dataset::from_columns(vec![
            ("text".into(), vec!["hello".into()]),
            ("source".into(), vec!["reddit".into()]),
        ])
        .unwrap();
        let err = get_label_columns(&ds, "text").unwrap_err();
        assert!(matches!(err, ClassifierError::UtilsError { .. }));
    }

    #[test]
    fn test_resolve_reorders_to_schema() {
        let schema = LabelSchema::new(["anger", "joy"]).unwrap();
        let detected = vec!["joy".to_string(), "anger".to_string(), "extra".to_string()];
        assert_eq!(resolve_label_columns(&detected, &schema).unwrap(), vec!["anger", "joy"]);
    }

    #[test]
    fn test_resolve_reports_missing_labels() {
        let schema = LabelSchema::goemotions();
        let err = resolve_label_columns(&["joy".to_string()], &schema).unwrap_err();
        assert!(matches!(err, ClassifierError::UtilsError { .. }));
        assert!(err.to_string().contains("missing 27 of 28"));
    }

    #[test]
    fn test_build_labels_in_requested_order() {
        let labels = build_labels(&dataset(), &["anger".to_string(), "joy".to_string()]).unwrap();
        assert_eq!(labels, array![[0.0, 1.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_split_sizes_and_determinism() {
        let x = Array2::from_shape_fn((10, 3), |(i, j)| (i * 3 + j) as u32);
        let y = Array2::from_shape_fn((10, 2), |(i, _)| i as f32);

        let a = split_dataset(&x, &y, 0.2, 42).unwrap();
        let b = split_dataset(&x, &y, 0.2, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.x_train.nrows(), 8);
        assert_eq!(a.x_val.nrows(), 2);

        // rows stay aligned between features and labels
        for (xr, yr) in a.x_val.rows().into_iter().zip(a.y_val.rows()) {
            assert_eq!(xr[0] / 3, yr[0] as u32);
        }
    }

    #[test]
    fn test_split_rejects_mismatched_rows() {
        let x = Array2::<u32>::zeros((4, 2));
        let y = Array2::<f32>::zeros((3, 2));
        assert!(matches!(
            split_dataset(&x, &y, 0.2, 42),
            Err(ClassifierError::UtilsError { .. })
        ));
        assert!(split_dataset(&x, &Array2::zeros((4, 2)), 1.5, 42).is_err());
    }
}
