use ndarray::Array2;

use crate::error::ClassifierError;

/// Anything that turns a batch of padded token-id rows into per-label probabilities.
///
/// Implementations must return one row per input row and one column per label,
/// with every value in `[0, 1]`. Labels are scored independently, so a row does
/// not sum to one.
pub trait Scorer: Send + Sync {
    fn score(&self, batch: &Array2<u32>) -> Result<Array2<f32>, ClassifierError>;

    /// Width of every returned row
    fn num_classes(&self) -> usize;

    /// Sequence length the scorer was built for, when it is fixed
    fn max_len(&self) -> Option<usize> {
        None
    }
}

impl<S: Scorer + ?Sized> Scorer for Box<S> {
    fn score(&self, batch: &Array2<u32>) -> Result<Array2<f32>, ClassifierError> {
        (**self).score(batch)
    }

    fn num_classes(&self) -> usize {
        (**self).num_classes()
    }

    fn max_len(&self) -> Option<usize> {
        (**self).max_len()
    }
}
