use crate::{error::Result, layers::dense::Layer, math::matrix::Matrix};

/// Plain gradient descent, with optional classic momentum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sgd {
    pub learning_rate: f64,
    /// 0.0 disables momentum; no velocity buffers are allocated then.
    pub momentum: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate, momentum: 0.0 }
    }

    pub fn with_momentum(learning_rate: f64, momentum: f64) -> Sgd {
        Sgd { learning_rate, momentum }
    }

    /// Applies one SGD weight update to a layer given its pre-computed gradients.
    pub fn step(&self, layer: &mut Layer, weights_grad: &Matrix, biases_grad: &[f64]) -> Result<()> {
        layer.apply_gradients(weights_grad, biases_grad, self.learning_rate, self.momentum)
    }
}
