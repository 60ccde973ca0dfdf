use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// First and second moment estimates for one dense layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerMoments {
    m_weights: Array2<f64>,
    v_weights: Array2<f64>,
    m_bias: Array2<f64>,
    v_bias: Array2<f64>,
}

impl LayerMoments {
    pub fn zeros_like(weights: &Array2<f64>, bias: &Array2<f64>) -> Self {
        Self {
            m_weights: Array2::zeros(weights.raw_dim()),
            v_weights: Array2::zeros(weights.raw_dim()),
            m_bias: Array2::zeros(bias.raw_dim()),
            v_bias: Array2::zeros(bias.raw_dim()),
        }
    }

    fn matches(&self, weights: &Array2<f64>, bias: &Array2<f64>) -> bool {
        self.m_weights.raw_dim() == weights.raw_dim() && self.m_bias.raw_dim() == bias.raw_dim()
    }
}

/// Adam with Keras default hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    step: u64,
    moments: Vec<LayerMoments>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
            moments: Vec::new(),
        }
    }

    pub fn steps(&self) -> u64 {
        self.step
    }

    /// Starts a new update step; call once per mini-batch before `update`.
    pub fn begin_step(&mut self) {
        self.step += 1;
    }

    fn step_size(&self) -> f64 {
        let t = self.step.max(1) as f64;
        self.learning_rate * (1.0 - self.beta2.powf(t)).sqrt() / (1.0 - self.beta1.powf(t))
    }

    /// Allocates zero moments for every layer whose slot is missing or has another shape.
    pub fn ensure_moments<'a, I>(&mut self, layers: I)
    where
        I: IntoIterator<Item = (&'a Array2<f64>, &'a Array2<f64>)>,
    {
        for (index, (weights, bias)) in layers.into_iter().enumerate() {
            match self.moments.get_mut(index) {
                Some(state) if state.matches(weights, bias) => {}
                Some(state) => *state = LayerMoments::zeros_like(weights, bias),
                None => self.moments.push(LayerMoments::zeros_like(weights, bias)),
            }
        }
    }

    /// Applies one update to layer `index`.
    pub fn update(
        &mut self,
        index: usize,
        weights: &mut Array2<f64>,
        bias: &mut Array2<f64>,
        grad_weights: &Array2<f64>,
        grad_bias: &Array2<f64>,
    ) {
        if self.moments.len() <= index {
            self.moments
                .resize_with(index + 1, || LayerMoments::zeros_like(weights, bias));
        }
        if !self.moments[index].matches(weights, bias) {
            self.moments[index] = LayerMoments::zeros_like(weights, bias);
        }
        let alpha = self.step_size();
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);
        let state = &mut self.moments[index];

        state.m_weights = &state.m_weights * b1 + grad_weights * (1.0 - b1);
        state.v_weights = &state.v_weights * b2 + &grad_weights.mapv(|g| g * g) * (1.0 - b2);
        *weights -= &(&state.m_weights / &state.v_weights.mapv(|v| v.sqrt() + eps) * alpha);

        state.m_bias = &state.m_bias * b1 + grad_bias * (1.0 - b1);
        state.v_bias = &state.v_bias * b2 + &grad_bias.mapv(|g| g * g) * (1.0 - b2);
        *bias -= &(&state.m_bias / &state.v_bias.mapv(|v| v.sqrt() + eps) * alpha);
    }
}
