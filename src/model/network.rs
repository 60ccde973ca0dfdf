use ndarray::{Array2, Axis, ErrorKind, ShapeError};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use tracing::debug;

use super::activation::Activation;
use super::optimizer::Adam;
use crate::error::{ForecastError, Result};

pub const STANDARD_INPUT_SIZE: usize = 2;
pub const STANDARD_LEARNING_RATE: f64 = 0.01;
pub const DEFAULT_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Array2<f64>,
    pub bias: Array2<f64>,
    pub activation: Activation,
}

impl DenseLayer {
    /// Glorot-uniform weights, zero bias.
    pub fn new(input_size: usize, units: usize, activation: Activation) -> Self {
        let limit = (6.0 / (input_size + units) as f64).sqrt();
        Self {
            weights: Array2::random((input_size, units), Uniform::new(-limit, limit)),
            bias: Array2::zeros((1, units)),
            activation,
        }
    }

    pub fn units(&self) -> usize {
        self.weights.ncols()
    }

    fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        self.activation.apply(&(x.dot(&self.weights) + &self.bias))
    }
}

/// Fully-connected regression network trained with MSE and Adam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralNetwork {
    pub layers: Vec<DenseLayer>,
    pub optimizer: Adam,
}

impl NeuralNetwork {
    pub fn new(input_size: usize, layers: &[(usize, Activation)], learning_rate: f64) -> Self {
        let mut fan_in = input_size;
        let layers = layers
            .iter()
            .map(|&(units, activation)| {
                let layer = DenseLayer::new(fan_in, units, activation);
                fan_in = units;
                layer
            })
            .collect();
        Self {
            layers,
            optimizer: Adam::new(learning_rate),
        }
    }

    /// Built-in architecture: 64 and 32 ReLU units, one linear output.
    pub fn standard() -> Self {
        Self::new(
            STANDARD_INPUT_SIZE,
            &[
                (64, Activation::Relu),
                (32, Activation::Relu),
                (1, Activation::Linear),
            ],
            STANDARD_LEARNING_RATE,
        )
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map(|l| l.weights.nrows()).unwrap_or(0)
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map(DenseLayer::units).unwrap_or(0)
    }

    /// Returns the input followed by every layer's output.
    pub fn forward(&self, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let mut outputs = Vec::with_capacity(self.layers.len() + 1);
        outputs.push(x.clone());
        for layer in &self.layers {
            let next = layer.forward(&outputs[outputs.len() - 1]);
            outputs.push(next);
        }
        outputs
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.input_size() {
            return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
        }
        Ok(self.forward(x).pop().unwrap_or_else(|| x.clone()))
    }

    /// One gradient step on a mini-batch; returns the batch loss before the step.
    pub fn train_batch(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> f64 {
        let outputs = self.forward(x);
        let prediction = &outputs[outputs.len() - 1];
        let loss = mse(y, prediction);

        // d(mean squared error)/d(prediction)
        let scale = 2.0 / (prediction.len() as f64);
        let mut grad = (prediction - y) * scale;

        self.optimizer
            .ensure_moments(self.layers.iter().map(|l| (&l.weights, &l.bias)));
        self.optimizer.begin_step();
        for i in (0..self.layers.len()).rev() {
            let layer_out = &outputs[i + 1];
            let layer_in = &outputs[i];
            let delta = grad * self.layers[i].activation.derivative(layer_out);

            let grad_weights = layer_in.t().dot(&delta);
            let grad_bias = delta.sum_axis(Axis(0)).insert_axis(Axis(0));
            grad = delta.dot(&self.layers[i].weights.t());

            let layer = &mut self.layers[i];
            self.optimizer
                .update(i, &mut layer.weights, &mut layer.bias, &grad_weights, &grad_bias);
        }

        loss
    }

    /// Mini-batch training with per-epoch shuffling.
    ///
    /// Returns the sample-weighted mean loss of every epoch. `on_epoch` runs after
    /// each epoch with the zero-based epoch index; `Break` stops with
    /// [`ForecastError::Cancelled`].
    pub fn fit<R, F>(
        &mut self,
        x: &Array2<f64>,
        y: &Array2<f64>,
        epochs: usize,
        batch_size: usize,
        rng: &mut R,
        mut on_epoch: F,
    ) -> Result<Vec<f64>>
    where
        R: Rng + ?Sized,
        F: FnMut(usize, f64) -> ControlFlow<()>,
    {
        if x.nrows() != y.nrows()
            || x.ncols() != self.input_size()
            || y.ncols() != self.output_size()
        {
            return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
        }
        if x.nrows() == 0 {
            return Err(ForecastError::InsufficientData {
                needed: 1,
                found: 0,
            });
        }

        let batch_size = batch_size.max(1);
        let mut indices: Vec<usize> = (0..x.nrows()).collect();
        let mut history = Vec::with_capacity(epochs);

        for epoch in 0..epochs {
            indices.shuffle(rng);
            let mut total = 0.0;
            for batch in indices.chunks(batch_size) {
                let xb = x.select(Axis(0), batch);
                let yb = y.select(Axis(0), batch);
                total += self.train_batch(&xb, &yb) * batch.len() as f64;
            }
            let loss = total / x.nrows() as f64;
            debug!(epoch = epoch + 1, loss, "epoch finished");
            history.push(loss);

            if on_epoch(epoch, loss).is_break() {
                return Err(ForecastError::Cancelled);
            }
        }

        Ok(history)
    }
}

pub fn mse(y_true: &Array2<f64>, y_pred: &Array2<f64>) -> f64 {
    let diff = y_pred - y_true;
    diff.mapv(|d| d * d).mean().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn standard_architecture_shape() {
        let nn = NeuralNetwork::standard();
        let units: Vec<usize> = nn.layers.iter().map(DenseLayer::units).collect();
        assert_eq!(units, vec![64, 32, 1]);
        assert_eq!(nn.input_size(), 2);
        assert_eq!(nn.layers[2].activation, Activation::Linear);
        assert_eq!(nn.optimizer.learning_rate, 0.01);
    }

    #[test]
    fn predict_checks_input_width() {
        let nn = NeuralNetwork::standard();
        assert!(nn.predict(&array![[0.1, 0.2, 0.3]]).is_err());
        assert_eq!(nn.predict(&array![[0.1, 0.2]]).unwrap().shape(), &[1, 1]);
    }

    #[test]
    fn fit_reduces_loss_on_linear_target() {
        let mut rng = StdRng::seed_from_u64(7);
        let x = Array2::from_shape_fn((40, 2), |(i, j)| ((i * (j + 1)) % 13) as f64 / 13.0);
        let y = Array2::from_shape_fn((40, 1), |(i, _)| 0.3 * x[[i, 0]] + 0.6 * x[[i, 1]]);

        let mut nn = NeuralNetwork::standard();
        let history = nn
            .fit(&x, &y, 150, DEFAULT_BATCH_SIZE, &mut rng, |_, _| ControlFlow::Continue(()))
            .unwrap();

        assert_eq!(history.len(), 150);
        assert!(history[149] < history[0]);
        assert!(history[149] < 0.01);
    }

    #[test]
    fn break_cancels_between_epochs() {
        let mut rng = StdRng::seed_from_u64(1);
        let x = array![[0.0, 0.0], [1.0, 1.0]];
        let y = array![[0.0], [1.0]];
        let mut nn = NeuralNetwork::standard();
        let mut seen = 0;
        let err = nn
            .fit(&x, &y, 10, 32, &mut rng, |epoch, _| {
                seen = epoch + 1;
                if epoch == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap_err();
        assert!(matches!(err, ForecastError::Cancelled));
        assert_eq!(seen, 3);
    }

    #[test]
    fn standard_network_steps_update_every_layer() {
        let x = array![[0.0, 0.0], [0.5, 0.25], [1.0, 1.0]];
        let y = array![[0.0], [0.4], [1.0]];
        let mut nn = NeuralNetwork::standard();
        let before: Vec<Array2<f64>> = nn.layers.iter().map(|l| l.weights.clone()).collect();

        for _ in 0..3 {
            assert!(nn.train_batch(&x, &y).is_finite());
        }

        assert_eq!(nn.optimizer.steps(), 3);
        for (layer, old) in nn.layers.iter().zip(&before) {
            assert_ne!(&layer.weights, old);
            assert!(layer.weights.iter().all(|w| w.is_finite()));
            assert!(layer.bias.iter().all(|b| b.is_finite()));
        }
    }

    #[test]
    fn mse_of_known_values() {
        assert_eq!(mse(&array![[1.0], [3.0]], &array![[2.0], [1.0]]), 2.5);
    }
}
