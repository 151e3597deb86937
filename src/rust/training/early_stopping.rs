/// What the trainer should do after an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochOutcome {
    /// Validation loss improved; checkpoint the weights
    Improved,
    NoImprovement,
    /// Patience exhausted
    Stop,
}

/// Stops training once validation loss has not improved for `patience` epochs.
#[derive(Debug, Clone, PartialEq)]
pub struct EarlyStopping {
    pub patience: usize,
    /// Reload the checkpointed best weights when training ends
    pub restore_best_weights: bool,
    best_loss: Option<f32>,
    best_epoch: Option<usize>,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize, restore_best_weights: bool) -> Self {
        Self {
            patience,
            restore_best_weights,
            best_loss: None,
            best_epoch: None,
            wait: 0,
        }
    }

    /// Records the validation loss of `epoch`.
    ///
    /// Any strict decrease counts as an improvement. A non-finite loss never does.
    pub fn update(&mut self, epoch: usize, val_loss: f32) -> EpochOutcome {
        let improved = val_loss.is_finite() && self.best_loss.map_or(true, |best| val_loss < best);
        if improved {
            self.best_loss = Some(val_loss);
            self.best_epoch = Some(epoch);
            self.wait = 0;
            return EpochOutcome::Improved;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            EpochOutcome::Stop
        } else {
            EpochOutcome::NoImprovement
        }
    }

    pub fn best_loss(&self) -> Option<f32> {
        self.best_loss
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Epochs since the last improvement
    pub fn wait(&self) -> usize {
        self.wait
    }
}
