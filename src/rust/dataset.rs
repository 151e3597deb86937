use std::fs::File;
use std::path::Path;

use csv::ReaderBuilder;
use log::info;

use crate::error::{ClassifierError, Stage, StageContext};

/// A single named CSV column, stored as raw cell strings.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<String>,
}

impl Column {
    /// True when every cell parses as a number.
    ///
    /// Empty cells disqualify a column, so boolean or id columns are never
    /// mistaken for labels.
    pub fn is_numeric(&self) -> bool {
        self.values
            .iter()
            .all(|v| v.trim().parse::<f64>().is_ok())
    }
}

/// A column-major table loaded from a CSV file with a header row.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
    rows: usize,
}

impl Dataset {
    /// Builds a dataset from `(name, values)` pairs; all columns must have the same length.
    pub fn from_columns(columns: Vec<(String, Vec<String>)>) -> Result<Self, ClassifierError> {
        let rows = columns.first().map(|(_, values)| values.len()).unwrap_or(0);
        if let Some((name, values)) = columns.iter().find(|(_, values)| values.len() != rows) {
            return Err(ClassifierError::new(
                Stage::DataLoader,
                format!("Column '{}' has {} rows, expected {}", name, values.len(), rows),
            ));
        }
        Ok(Self {
            columns: columns
                .into_iter()
                .map(|(name, values)| Column { name, values })
                .collect(),
            rows,
        })
    }

    /// Number of data rows (the header is not counted).
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.columns.len())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }
}

/// Loads a CSV dataset from `file_path`.
///
/// # Errors
/// * `DataLoaderError` if the file does not exist, cannot be opened, or a row
///   cannot be parsed (ragged rows included).
pub fn load_data(file_path: impl AsRef<Path>) -> Result<Dataset, ClassifierError> {
    let path = file_path.as_ref();
    if !path.exists() {
        return Err(ClassifierError::new(
            Stage::DataLoader,
            format!("FilePath: {} is not found", path.display()),
        ));
    }

    let file = File::open(path)
        .stage_context(Stage::DataLoader, format!("Failed to open {}", path.display()))?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .stage_context(Stage::DataLoader, "Failed to read CSV header")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut columns: Vec<(String, Vec<String>)> =
        headers.into_iter().map(|name| (name, Vec::new())).collect();

    for (line, record) in reader.records().enumerate() {
        let record = record.stage_context(
            Stage::DataLoader,
            format!("Failed to parse row {} of {}", line + 1, path.display()),
        )?;
        for ((_, values), cell) in columns.iter_mut().zip(record.iter()) {
            values.push(cell.to_string());
        }
    }

    let dataset = Dataset::from_columns(columns)?;
    let (rows, cols) = dataset.shape();
    info!("Data loaded from {}. Shape: ({}, {})", path.display(), rows, cols);
    Ok(dataset)
}
