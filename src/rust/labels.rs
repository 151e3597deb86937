//! The GoEmotions label schema and the policies that turn a score vector into emotions.
//!
//! The position of a name in a [`LabelSchema`] is the column index used by the
//! training label matrix and by every prediction vector. Reordering it between
//! training and inference silently corrupts every prediction, which is why the
//! model metadata stores the schema it was trained with.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_THRESHOLD, DEFAULT_TOP_K};
use crate::error::{ClassifierError, Stage};

/// The 28 GoEmotions categories in canonical column order.
pub const GOEMOTIONS_LABELS: [&str; 28] = [
    "admiration",
    "amusement",
    "anger",
    "annoyance",
    "approval",
    "caring",
    "confusion",
    "curiosity",
    "desire",
    "disappointment",
    "disapproval",
    "disgust",
    "embarrassment",
    "excitement",
    "fear",
    "gratitude",
    "grief",
    "joy",
    "love",
    "nervousness",
    "optimism",
    "pride",
    "realization",
    "relief",
    "remorse",
    "sadness",
    "surprise",
    "neutral",
];

/// Ordered list of label names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSchema(Vec<String>);

impl Default for LabelSchema {
    fn default() -> Self {
        Self::goemotions()
    }
}

impl LabelSchema {
    pub fn goemotions() -> Self {
        Self(GOEMOTIONS_LABELS.iter().map(|s| s.to_string()).collect())
    }

    /// Creates a custom schema. Names must be non-empty and unique.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Result<Self, ClassifierError> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(ClassifierError::new(Stage::Utils, "Label schema cannot be empty"));
        }
        if let Some(pos) = names.iter().position(|n| n.trim().is_empty()) {
            return Err(ClassifierError::new(
                Stage::Utils,
                format!("Label {} cannot be empty", pos + 1),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(ClassifierError::new(Stage::Utils, format!("Duplicate label '{}'", dup)));
        }
        Ok(Self(names))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|n| n == name)
    }
}

/// How a prediction vector is reduced to a set of emotions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionPolicy {
    /// The `k` highest scores, always `min(k, labels)` results
    TopK(usize),
    /// Every label scoring at least the threshold, possibly none
    Threshold(f32),
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::default_top_k()
    }
}

impl SelectionPolicy {
    pub fn default_top_k() -> Self {
        Self::TopK(DEFAULT_TOP_K)
    }

    pub fn default_threshold() -> Self {
        Self::Threshold(DEFAULT_THRESHOLD)
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopK(k) => write!(f, "top-{}", k),
            Self::Threshold(t) => write!(f, "threshold >= {:.2}", t),
        }
    }
}

/// A label with its independent probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionScore {
    pub label: String,
    pub score: f32,
}

/// Emotions selected from one prediction vector, highest score first.
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionResult {
    pub policy: SelectionPolicy,
    pub emotions: Vec<EmotionScore>,
}

impl EmotionResult {
    /// True when nothing was selected ("no strong emotion detected").
    pub fn is_empty(&self) -> bool {
        self.emotions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.emotions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EmotionScore> {
        self.emotions.iter()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.emotions.iter().map(|e| e.label.as_str()).collect()
    }
}

/// Schema positions ordered by descending score; ties keep schema order.
fn ranked(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order
}

/// Applies `policy` to a prediction vector.
///
/// # Errors
/// * `PredictionError` if `scores` does not have one entry per schema label
pub fn select(
    scores: &[f32],
    schema: &LabelSchema,
    policy: SelectionPolicy,
) -> Result<EmotionResult, ClassifierError> {
    if scores.len() != schema.len() {
        return Err(ClassifierError::new(
            Stage::Prediction,
            format!(
                "Prediction vector has {} scores but the label schema has {} labels",
                scores.len(),
                schema.len()
            ),
        ));
    }

    let order = ranked(scores);
    let chosen: Vec<usize> = match policy {
        SelectionPolicy::TopK(k) => order.into_iter().take(k).collect(),
        SelectionPolicy::Threshold(threshold) => order
            .into_iter()
            .filter(|&i| scores[i] >= threshold)
            .collect(),
    };

    let emotions = chosen
        .into_iter()
        .map(|i| EmotionScore {
            label: schema.names()[i].clone(),
            score: scores[i],
        })
        .collect();

    Ok(EmotionResult { policy, emotions })
}

/// Returns the `k` highest-scoring labels.
pub fn top_k(scores: &[f32], schema: &LabelSchema, k: usize) -> Result<EmotionResult, ClassifierError> {
    select(scores, schema, SelectionPolicy::TopK(k))
}

/// Returns every label scoring at least `threshold`.
pub fn above_threshold(
    scores: &[f32],
    schema: &LabelSchema,
    threshold: f32,
) -> Result<EmotionResult, ClassifierError> {
    select(scores, schema, SelectionPolicy::Threshold(threshold))
}
