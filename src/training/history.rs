use serde::{Deserialize, Serialize};

/// Per-epoch loss curve. Epochs are numbered from 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<usize>,
    pub losses: Vec<f64>,
}

impl TrainingHistory {
    pub fn from_losses(losses: Vec<f64>) -> Self {
        TrainingHistory {
            epochs: (1..=losses.len()).collect(),
            losses,
        }
    }

    pub fn record(&mut self, epoch: usize, loss: f64) {
        self.epochs.push(epoch);
        self.losses.push(loss);
    }

    pub fn len(&self) -> usize {
        self.losses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.losses.is_empty()
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.losses.last().copied()
    }
}
