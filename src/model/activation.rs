use ndarray::Array2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    Tanh,
    Linear,
}

impl Activation {
    pub fn apply(&self, x: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => relu(x),
            Activation::Tanh => x.mapv(f64::tanh),
            Activation::Linear => x.clone(),
        }
    }

    /// Derivative expressed through the activation's output.
    pub fn derivative(&self, output: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => relu_derivative(output),
            Activation::Tanh => output.mapv(|a| 1.0 - a * a),
            Activation::Linear => Array2::ones(output.raw_dim()),
        }
    }
}

pub fn relu(x: &Array2<f64>) -> Array2<f64> {
    x.mapv(|v| if v > 0.0 { v } else { 0.0 })
}

pub fn relu_derivative(x: &Array2<f64>) -> Array2<f64> {
    x.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
}
