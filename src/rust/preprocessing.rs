//! Deterministic text normalization.
//!
//! The steps run in a fixed order, and changing the order changes the output:
//! 1. lowercase
//! 2. strip `http(s)://` and `www.` URLs
//! 3. strip emoji (emoticons, pictographs, transport and flag ranges)
//! 4. drop every character that is not an ASCII letter, digit or whitespace
//! 5. collapse whitespace runs and trim
//!
//! The output only ever contains `[a-z0-9 ]`, which makes [`normalize`] idempotent.

use lazy_static::lazy_static;
use log::info;
use regex::Regex;

use crate::dataset::Dataset;
use crate::error::{ClassifierError, Stage};

lazy_static! {
    static ref URL_PATTERN: Result<Regex, regex::Error> = Regex::new(r"http[s]?://\S+|www\.\S+");
}

/// Unicode blocks removed by [`remove_emoji`].
const EMOJI_RANGES: [(u32, u32); 4] = [
    (0x1F600, 0x1F64F), // emoticons
    (0x1F300, 0x1F5FF), // symbols & pictographs
    (0x1F680, 0x1F6FF), // transport & map symbols
    (0x1F1E0, 0x1F1FF), // flags
];

fn url_pattern() -> Result<&'static Regex, ClassifierError> {
    URL_PATTERN
        .as_ref()
        .map_err(|e| ClassifierError::with_source(Stage::Preprocessing, "Invalid URL pattern", e.clone()))
}

/// Unicode whitespace plus the ASCII file, group, record and unit separators.
fn is_separator(c: char) -> bool {
    c.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&c)
}

fn is_emoji(c: char) -> bool {
    let code = c as u32;
    EMOJI_RANGES
        .iter()
        .any(|&(start, end)| (start..=end).contains(&code))
}

/// Removes URL substrings (`http://…`, `https://…`, `www.…`).
pub fn remove_urls(text: &str) -> Result<String, ClassifierError> {
    Ok(url_pattern()?.replace_all(text, "").into_owned())
}

/// Removes emoji code points in the emoticon, pictograph, transport and flag ranges.
pub fn remove_emoji(text: &str) -> String {
    text.chars().filter(|&c| !is_emoji(c)).collect()
}

/// Normalizes raw text into the form the vocabulary is fitted on.
///
/// # Example
/// ```
/// use emotive::preprocessing::normalize;
///
/// let cleaned = normalize("I absolutely love this, thank you!!! 😊 https://x.co").unwrap();
/// assert_eq!(cleaned, "i absolutely love this thank you");
/// ```
pub fn normalize(text: &str) -> Result<String, ClassifierError> {
    let lowered = text.to_lowercase();
    let without_urls = remove_urls(&lowered)?;
    let without_emoji = remove_emoji(&without_urls);

    let kept: String = without_emoji
        .chars()
        .filter(|&c| c.is_ascii_alphanumeric() || is_separator(c))
        .collect();

    Ok(kept
        .split(is_separator)
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" "))
}

/// Normalizes every cell of `text_column` in place.
pub fn preprocess_dataset(dataset: &mut Dataset, text_column: &str) -> Result<(), ClassifierError> {
    let column = dataset.column_mut(text_column).ok_or_else(|| {
        ClassifierError::new(
            Stage::Preprocessing,
            format!("Column '{}' not found in dataset", text_column),
        )
    })?;

    for value in column.values.iter_mut() {
        *value = normalize(value)?;
    }

    info!("Preprocessing completed for column {}", text_column);
    Ok(())
}
