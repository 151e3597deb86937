//! Interactive prediction loop used by `emotive predict`.

use std::io::{self, BufRead, Write};

use log::error;

use crate::inference::InferenceContext;
use crate::labels::{EmotionResult, SelectionPolicy};

pub const PROMPT: &str = "Enter text: ";
pub const QUIT_COMMAND: &str = "q";
pub const NO_EMOTION_MESSAGE: &str = "No strong emotions detected";

/// Renders a result the way the prediction loop prints it.
///
/// ```
/// use emotive::cli::format_result;
/// use emotive::{EmotionResult, EmotionScore, SelectionPolicy};
///
/// let result = EmotionResult {
///     policy: SelectionPolicy::TopK(1),
///     emotions: vec![EmotionScore { label: "joy".into(), score: 0.871 }],
/// };
/// assert_eq!(format_result(&result), "Top 1 Predicted Emotions:\n  joy: 0.87");
/// ```
pub fn format_result(result: &EmotionResult) -> String {
    let header = match result.policy {
        SelectionPolicy::TopK(k) => format!("Top {} Predicted Emotions:", k),
        SelectionPolicy::Threshold(t) => {
            if result.is_empty() {
                return NO_EMOTION_MESSAGE.to_string();
            }
            format!("Predicted Emotions (score >= {:.2}):", t)
        }
    };

    let mut lines = vec![header];
    lines.extend(result.iter().map(|e| format!("  {}: {:.2}", e.label, e.score)));
    lines.join("\n")
}

/// Reads lines from `input` until EOF or `q`, printing predictions to `output`.
///
/// A prediction failure is reported and the loop keeps going. Returns the
/// number of successful predictions.
pub fn run_repl<R: BufRead, W: Write>(ctx: &InferenceContext, mut input: R, output: &mut W) -> io::Result<usize> {
    writeln!(output, "\nEmotion Classifier (type '{}' to quit)\n", QUIT_COMMAND)?;

    let mut predictions = 0;
    let mut line = String::new();
    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim_end_matches(['\r', '\n']);
        if text.eq_ignore_ascii_case(QUIT_COMMAND) {
            break;
        }

        match ctx.predict(text) {
            Ok(result) => {
                writeln!(output, "\n{}\n", format_result(&result))?;
                predictions += 1;
            }
            Err(e) => {
                error!("{}", e);
                writeln!(output, "\nError: {}\n", e)?;
            }
        }
    }

    Ok(predictions)
}
