use serde::Serialize;

/// Decision threshold used for accuracy, precision and recall.
pub const METRIC_THRESHOLD: f32 = 0.5;

/// Confusion counts over flattened multi-label outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl MetricCounts {
    /// Adds one batch of probabilities against their 0/1 targets.
    pub fn update(&mut self, probabilities: &[f32], targets: &[f32]) {
        for (&p, &t) in probabilities.iter().zip(targets) {
            let predicted = p >= METRIC_THRESHOLD;
            let actual = t >= METRIC_THRESHOLD;
            match (predicted, actual) {
                (true, true) => self.true_positives += 1,
                (true, false) => self.false_positives += 1,
                (false, false) => self.true_negatives += 1,
                (false, true) => self.false_negatives += 1,
            }
        }
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn accuracy(&self) -> f32 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    pub fn precision(&self) -> f32 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f32 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }
}

fn ratio(numerator: usize, denominator: usize) -> f32 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f32 / denominator as f32
    }
}

/// Loss and thresholded metrics for one epoch, on both partitions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub precision: f32,
    pub recall: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
    pub val_precision: f32,
    pub val_recall: f32,
}

impl EpochMetrics {
    pub fn new(epoch: usize, loss: f32, train: &MetricCounts, val_loss: f32, val: &MetricCounts) -> Self {
        Self {
            epoch,
            loss,
            accuracy: train.accuracy(),
            precision: train.precision(),
            recall: train.recall(),
            val_loss,
            val_accuracy: val.accuracy(),
            val_precision: val.precision(),
            val_recall: val.recall(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_ratios() {
        let mut counts = MetricCounts::default();
        counts.update(&[0.9, 0.2, 0.6, 0.4], &[1.0, 0.0, 0.0, 1.0]);

        assert_eq!(counts.true_positives, 1);
        assert_eq!(counts.false_positives, 1);
        assert_eq!(counts.true_negatives, 1);
        assert_eq!(counts.false_negatives, 1);
        assert_eq!(counts.accuracy(), 0.5);
        assert_eq!(counts.precision(), 0.5);
        assert_eq!(counts.recall(), 0.5);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut counts = MetricCounts::default();
        counts.update(&[0.5], &[1.0]);
        assert_eq!(counts.true_positives, 1);
    }

    #[test]
    fn test_no_positive_predictions() {
        let mut counts = MetricCounts::default();
        counts.update(&[0.1, 0.1], &[0.0, 1.0]);
        assert_eq!(counts.precision(), 0.0);
        assert_eq!(counts.recall(), 0.0);
        assert_eq!(MetricCounts::default().accuracy(), 0.0);
    }
}
