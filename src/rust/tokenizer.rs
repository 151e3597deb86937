//! Word-level vocabulary fitted on normalized text.
//!
//! Id layout:
//! * `0` is reserved for padding and never assigned to a token
//! * `1` is the out-of-vocabulary id
//! * words start at `2`, most frequent first, ties in first-seen order
//!
//! A model is only meaningful together with the exact vocabulary it was trained
//! with, so the vocabulary round-trips losslessly through [`Vocabulary::save`]
//! and [`Vocabulary::load`] and exposes a [`Vocabulary::fingerprint`] that the
//! model metadata records.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{DEFAULT_OOV_TOKEN, MAX_SEQUENCE_LENGTH};
use crate::error::{ClassifierError, Stage, StageContext};

/// Id reserved for padding.
pub const PAD_ID: u32 = 0;
/// Id assigned to tokens missing from the vocabulary.
pub const OOV_ID: u32 = 1;

const FORMAT_VERSION: u32 = 1;

/// Which end of a sequence padding or truncation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Pre,
    #[default]
    Post,
}

/// Settings for [`pad_sequences`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadConfig {
    pub max_len: usize,
    pub padding: Side,
    pub truncating: Side,
}

impl Default for PadConfig {
    fn default() -> Self {
        Self {
            max_len: MAX_SEQUENCE_LENGTH,
            padding: Side::Post,
            truncating: Side::Post,
        }
    }
}

impl PadConfig {
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len,
            ..Self::default()
        }
    }
}

/// On-disk representation. `tokens[i]` has id `i + 1`, so `tokens[0]` is the OOV token.
#[derive(Serialize, Deserialize)]
struct VocabularyFile {
    format_version: u32,
    oov_token: String,
    num_words: usize,
    document_count: usize,
    tokens: Vec<String>,
}

/// A fitted token → id mapping.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    oov_token: String,
    num_words: usize,
    document_count: usize,
    tokens: Vec<String>,
    index: HashMap<String, u32>,
}

impl PartialEq for Vocabulary {
    fn eq(&self, other: &Self) -> bool {
        self.oov_token == other.oov_token
            && self.num_words == other.num_words
            && self.tokens == other.tokens
    }
}

impl Eq for Vocabulary {}

impl Vocabulary {
    /// Fits a vocabulary on a corpus of normalized texts.
    ///
    /// # Arguments
    /// * `corpus` - Normalized documents; tokens are whitespace-delimited
    /// * `num_words` - Number of usable ids including padding and OOV, so at most
    ///   `num_words - 2` words are kept
    /// * `oov_token` - Token string recorded for the OOV id
    ///
    /// # Errors
    /// * `TokenizerError` if the corpus is empty, contains no tokens, or
    ///   `num_words` leaves no room for a single word
    ///
    /// # Example
    /// ```
    /// use emotive::tokenizer::Vocabulary;
    ///
    /// let vocab = Vocabulary::fit(["so happy", "so sad"], 100, "<OOV>").unwrap();
    /// assert_eq!(vocab.encode("so happy today"), vec![2, 3, 1]);
    /// ```
    pub fn fit<I, S>(corpus: I, num_words: usize, oov_token: &str) -> Result<Self, ClassifierError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if num_words < 3 {
            return Err(ClassifierError::new(
                Stage::Tokenizer,
                format!("num_words must be at least 3 (padding, OOV and one word), got {}", num_words),
            ));
        }

        // (word, count) in first-seen order
        let mut counts: Vec<(String, usize)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut document_count = 0usize;

        for document in corpus {
            document_count += 1;
            for word in document.as_ref().split_whitespace() {
                match positions.get(word) {
                    Some(&pos) => counts[pos].1 += 1,
                    None => {
                        positions.insert(word.to_string(), counts.len());
                        counts.push((word.to_string(), 1));
                    }
                }
            }
        }

        if document_count == 0 {
            return Err(ClassifierError::new(Stage::Tokenizer, "Cannot fit tokenizer on an empty corpus"));
        }
        if counts.is_empty() {
            return Err(ClassifierError::new(
                Stage::Tokenizer,
                format!("Corpus of {} documents contains no tokens", document_count),
            ));
        }

        // stable: equal counts keep first-seen order
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        let distinct = counts.len();

        let mut tokens = Vec::with_capacity(num_words.min(distinct + 1));
        tokens.push(oov_token.to_string());
        tokens.extend(
            counts
                .into_iter()
                .filter(|(word, _)| word != oov_token)
                .take(num_words - 2)
                .map(|(word, _)| word),
        );

        info!(
            "Fitted tokenizer on {} texts: {} distinct words, {} kept",
            document_count,
            distinct,
            tokens.len() - 1
        );

        Ok(Self::from_parts(oov_token.to_string(), num_words, document_count, tokens))
    }

    fn from_parts(oov_token: String, num_words: usize, document_count: usize, tokens: Vec<String>) -> Self {
        let index = tokens
            .iter()
            .enumerate()
            .map(|(i, token)| (token.clone(), i as u32 + 1))
            .collect();
        Self {
            oov_token,
            num_words,
            document_count,
            tokens,
            index,
        }
    }

    pub fn oov_token(&self) -> &str {
        &self.oov_token
    }

    pub fn oov_id(&self) -> u32 {
        OOV_ID
    }

    pub fn num_words(&self) -> usize {
        self.num_words
    }

    /// Number of documents the vocabulary was fitted on.
    pub fn document_count(&self) -> usize {
        self.document_count
    }

    /// Number of mapped ids (OOV included).
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Embedding input size: every mapped id plus the padding id.
    pub fn vocab_size(&self) -> usize {
        self.tokens.len() + 1
    }

    pub fn id(&self, token: &str) -> Option<u32> {
        self.index.get(token).copied()
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        if id == PAD_ID {
            return None;
        }
        self.tokens.get(id as usize - 1).map(String::as_str)
    }

    /// Maps each whitespace-delimited token to its id, unknown tokens to the OOV id.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        text.split_whitespace()
            .map(|word| self.id(word).unwrap_or(OOV_ID))
            .collect()
    }

    pub fn texts_to_sequences<S: AsRef<str>>(&self, texts: &[S]) -> Vec<Vec<u32>> {
        let sequences: Vec<Vec<u32>> = texts.iter().map(|t| self.encode(t.as_ref())).collect();
        debug!("Converted {} texts to sequences", sequences.len());
        sequences
    }

    fn to_file(&self) -> VocabularyFile {
        VocabularyFile {
            format_version: FORMAT_VERSION,
            oov_token: self.oov_token.clone(),
            num_words: self.num_words,
            document_count: self.document_count,
            tokens: self.tokens.clone(),
        }
    }

    /// SHA-256 over the canonical serialized vocabulary, hex encoded.
    pub fn fingerprint(&self) -> Result<String, ClassifierError> {
        let bytes = serde_json::to_vec(&self.to_file())
            .stage_context(Stage::Tokenizer, "Failed to serialize vocabulary")?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Writes the vocabulary as JSON, creating parent directories as needed.
    pub fn save(&self, file_path: impl AsRef<Path>) -> Result<(), ClassifierError> {
        let path = file_path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).stage_context(
                Stage::Tokenizer,
                format!("Failed to create directory {}", parent.display()),
            )?;
        }
        let json = serde_json::to_string_pretty(&self.to_file())
            .stage_context(Stage::Tokenizer, "Failed to serialize vocabulary")?;
        fs::write(path, json).stage_context(
            Stage::Tokenizer,
            format!("Error while saving tokenizer to {}", path.display()),
        )?;
        info!("Saved tokenizer to {}", path.display());
        Ok(())
    }

    /// Loads a vocabulary written by [`Vocabulary::save`].
    pub fn load(file_path: impl AsRef<Path>) -> Result<Self, ClassifierError> {
        let path = file_path.as_ref();
        let json = fs::read_to_string(path).stage_context(
            Stage::Tokenizer,
            format!("Error while loading tokenizer from {}", path.display()),
        )?;
        let file: VocabularyFile = serde_json::from_str(&json).stage_context(
            Stage::Tokenizer,
            format!("Corrupt tokenizer file {}", path.display()),
        )?;

        if file.format_version != FORMAT_VERSION {
            return Err(ClassifierError::new(
                Stage::Tokenizer,
                format!(
                    "Unsupported tokenizer format version {} (expected {})",
                    file.format_version, FORMAT_VERSION
                ),
            ));
        }
        if file.tokens.first() != Some(&file.oov_token) {
            return Err(ClassifierError::new(
                Stage::Tokenizer,
                format!("Corrupt tokenizer file {}: OOV token is not at id {}", path.display(), OOV_ID),
            ));
        }

        let vocabulary = Self::from_parts(file.oov_token, file.num_words, file.document_count, file.tokens);
        if vocabulary.index.len() != vocabulary.tokens.len() {
            return Err(ClassifierError::new(
                Stage::Tokenizer,
                format!("Corrupt tokenizer file {}: duplicate tokens", path.display()),
            ));
        }

        info!("Loaded tokenizer from {} ({} ids)", path.display(), vocabulary.len());
        Ok(vocabulary)
    }
}

/// Fits a vocabulary with the default OOV token.
pub fn fit_tokenizer<I, S>(texts: I, num_words: usize) -> Result<Vocabulary, ClassifierError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Vocabulary::fit(texts, num_words, DEFAULT_OOV_TOKEN)
}

fn fit_to_length(sequence: &[u32], config: &PadConfig) -> Vec<u32> {
    let max_len = config.max_len;
    let kept = if sequence.len() > max_len {
        match config.truncating {
            Side::Post => &sequence[..max_len],
            Side::Pre => &sequence[sequence.len() - max_len..],
        }
    } else {
        sequence
    };

    let fill = max_len - kept.len();
    let mut padded = Vec::with_capacity(max_len);
    match config.padding {
        Side::Post => {
            padded.extend_from_slice(kept);
            padded.resize(max_len, PAD_ID);
        }
        Side::Pre => {
            padded.resize(fill, PAD_ID);
            padded.extend_from_slice(kept);
        }
    }
    padded
}

/// Post-truncates and post-pads a single sequence to exactly `max_len` ids.
pub fn pad(sequence: &[u32], max_len: usize) -> Result<Vec<u32>, ClassifierError> {
    if max_len == 0 {
        return Err(ClassifierError::new(Stage::Tokenizer, "max_len must be greater than zero"));
    }
    Ok(fit_to_length(sequence, &PadConfig::with_max_len(max_len)))
}

/// Pads/truncates every sequence to `config.max_len` and stacks them row-wise.
pub fn pad_sequences(sequences: &[Vec<u32>], config: &PadConfig) -> Result<Array2<u32>, ClassifierError> {
    if config.max_len == 0 {
        return Err(ClassifierError::new(Stage::Tokenizer, "max_len must be greater than zero"));
    }

    let flat: Vec<u32> = sequences
        .iter()
        .flat_map(|sequence| fit_to_length(sequence, config))
        .collect();

    let padded = Array2::from_shape_vec((sequences.len(), config.max_len), flat)
        .stage_context(Stage::Tokenizer, "Error while padding")?;
    debug!("Padded {} sequences to length {}", sequences.len(), config.max_len);
    Ok(padded)
}
