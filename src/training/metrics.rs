use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Test-partition errors in physical units (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub mae: f64,
    pub mse: f64,
}

impl Evaluation {
    pub fn compute(y_true: &Array2<f64>, y_pred: &Array2<f64>) -> Self {
        let n = y_true.len().max(1) as f64;
        let (abs_sum, sq_sum) = y_true
            .iter()
            .zip(y_pred.iter())
            .fold((0.0, 0.0), |(a, s), (t, p)| {
                let d = p - t;
                (a + d.abs(), s + d * d)
            });
        Self {
            mae: abs_sum / n,
            mse: sq_sum / n,
        }
    }

    pub fn rmse(&self) -> f64 {
        self.mse.sqrt()
    }
}
