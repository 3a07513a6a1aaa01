use rand::Rng;

use crate::{
    activation::activation::ActivationFunction,
    error::{NetworkError, Result},
    math::matrix::Matrix,
};

/// Weights, biases and activation linking a layer to its predecessor.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerParams {
    /// Shape: `size × previous.size`.
    pub weights: Matrix,
    pub biases: Vec<f64>,
    pub activator: ActivationFunction,
    // momentum buffers, allocated on the first update with momentum > 0
    weight_velocity: Option<Matrix>,
    bias_velocity: Option<Vec<f64>>,
}

/// One position in the network chain.
///
/// The input layer carries no parameters: its activations are written
/// directly by the caller. Every other layer owns the weights that connect
/// it to the layer before it.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub size: usize,
    pub activations: Vec<f64>,
    pre_activations: Vec<f64>,  // z = Wx + b, kept for the derivative during backprop
    params: Option<LayerParams>,
}

impl Layer {
    /// Input layer with `size` activation slots.
    pub fn input(size: usize) -> Layer {
        Layer {
            size,
            activations: vec![0.0; size],
            pre_activations: vec![0.0; size],
            params: None,
        }
    }

    /// Hidden or output layer with zeroed weights and biases.
    pub fn dense(size: usize, previous_size: usize, activation: ActivationFunction) -> Layer {
        Layer::assemble(Matrix::zeros(size, previous_size), vec![0.0; size], activation)
    }

    /// Hidden or output layer with randomly initialised weights and zero biases.
    ///
    /// ReLU layers use He initialisation, everything else Xavier.
    pub fn random<R: Rng + ?Sized>(
        size: usize,
        previous_size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Layer {
        let weights = match activation {
            ActivationFunction::ReLU => Matrix::he(size, previous_size, rng),
            _ => Matrix::xavier(size, previous_size, rng),
        };
        Layer::assemble(weights, vec![0.0; size], activation)
    }

    /// Hidden or output layer from explicit parameters.
    pub fn with_params(weights: Matrix, biases: Vec<f64>, activation: ActivationFunction) -> Result<Layer> {
        if biases.len() != weights.rows {
            return Err(NetworkError::DimensionMismatch {
                expected: weights.rows,
                actual: biases.len(),
            });
        }
        Ok(Layer::assemble(weights, biases, activation))
    }

    fn assemble(weights: Matrix, biases: Vec<f64>, activator: ActivationFunction) -> Layer {
        let size = biases.len();
        Layer {
            size,
            activations: vec![0.0; size],
            pre_activations: vec![0.0; size],
            params: Some(LayerParams {
                weights,
                biases,
                activator,
                weight_velocity: None,
                bias_velocity: None,
            }),
        }
    }

    pub fn is_input(&self) -> bool {
        self.params.is_none()
    }

    pub fn params(&self) -> Option<&LayerParams> {
        self.params.as_ref()
    }

    pub fn weights(&self) -> Option<&Matrix> {
        self.params.as_ref().map(|p| &p.weights)
    }

    pub fn biases(&self) -> Option<&[f64]> {
        self.params.as_ref().map(|p| p.biases.as_slice())
    }

    pub fn activator(&self) -> Option<ActivationFunction> {
        self.params.as_ref().map(|p| p.activator)
    }

    /// Number of neurons in the predecessor, `None` for the input layer.
    pub fn input_size(&self) -> Option<usize> {
        self.params.as_ref().map(|p| p.weights.cols)
    }

    pub fn pre_activations(&self) -> &[f64] {
        &self.pre_activations
    }

    /// Writes raw values into the activations (input layer use).
    pub fn set_activations(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.size {
            return Err(NetworkError::DimensionMismatch {
                expected: self.size,
                actual: values.len(),
            });
        }
        self.activations.copy_from_slice(values);
        Ok(())
    }

    /// Computes `activations = f(W · previous + b)` in place.
    pub fn feed_from(&mut self, previous: &[f64]) -> Result<()> {
        let params = self.params.as_ref().ok_or_else(|| {
            NetworkError::Structural("forward pass on a layer without a predecessor".into())
        })?;
        if previous.len() != params.weights.cols {
            return Err(NetworkError::Structural(format!(
                "layer expects {} inputs but predecessor has {}",
                params.weights.cols,
                previous.len()
            )));
        }

        params.weights.mul_vec_into(previous, &mut self.pre_activations);
        for ((z, a), b) in self.pre_activations.iter_mut()
            .zip(self.activations.iter_mut())
            .zip(&params.biases)
        {
            *z += b;
            *a = params.activator.function(*z);
        }
        Ok(())
    }

    /// Computes gradient adjustments. Returns (weights_grad, biases_grad).
    ///
    /// `error` is ∂L/∂a for this layer and `inputs` the predecessor's
    /// activations from the same forward pass. The bias gradient doubles as
    /// the layer delta δ = error ⊙ f'(z).
    pub fn compute_gradients(&self, error: &[f64], inputs: &[f64]) -> Result<(Matrix, Vec<f64>)> {
        let params = self.params.as_ref().ok_or_else(|| {
            NetworkError::Structural("gradient requested for the input layer".into())
        })?;
        if error.len() != self.size || inputs.len() != params.weights.cols {
            return Err(NetworkError::Structural(format!(
                "gradient shapes ({}, {}) do not match layer {}x{}",
                error.len(),
                inputs.len(),
                self.size,
                params.weights.cols
            )));
        }

        let delta: Vec<f64> = error.iter()
            .zip(&self.pre_activations)
            .map(|(e, &z)| e * params.activator.derivative(z))
            .collect();

        let mut weights_grad = Matrix::zeros(self.size, params.weights.cols);
        for (row, &d) in weights_grad.data.iter_mut().zip(&delta) {
            for (g, x) in row.iter_mut().zip(inputs) {
                *g = d * x;
            }
        }

        Ok((weights_grad, delta))
    }

    /// Routes this layer's delta back to ∂L/∂a of the predecessor.
    pub fn propagate_back(&self, delta: &[f64]) -> Result<Vec<f64>> {
        let params = self.params.as_ref().ok_or_else(|| {
            NetworkError::Structural("cannot propagate past the input layer".into())
        })?;
        Ok(params.weights.transpose_mul_vec(delta))
    }

    /// Applies pre-computed gradients scaled by `lr`, with optional momentum.
    pub fn apply_gradients(&mut self, weights_grad: &Matrix, biases_grad: &[f64], lr: f64, momentum: f64) -> Result<()> {
        let params = self.params.as_mut().ok_or_else(|| {
            NetworkError::Structural("cannot update the input layer".into())
        })?;
        if weights_grad.rows != params.weights.rows
            || weights_grad.cols != params.weights.cols
            || biases_grad.len() != params.biases.len()
        {
            return Err(NetworkError::Structural("gradient shape does not match layer parameters".into()));
        }

        if momentum > 0.0 {
            let w_vel = params.weight_velocity
                .get_or_insert_with(|| Matrix::zeros(weights_grad.rows, weights_grad.cols));
            for ((w_row, v_row), g_row) in params.weights.data.iter_mut()
                .zip(w_vel.data.iter_mut())
                .zip(&weights_grad.data)
            {
                for ((w, v), g) in w_row.iter_mut().zip(v_row.iter_mut()).zip(g_row) {
                    *v = momentum * *v + g;
                    *w -= lr * *v;
                }
            }

            let b_vel = params.bias_velocity.get_or_insert_with(|| vec![0.0; biases_grad.len()]);
            for ((b, v), g) in params.biases.iter_mut().zip(b_vel.iter_mut()).zip(biases_grad) {
                *v = momentum * *v + g;
                *b -= lr * *v;
            }
        } else {
            for (w_row, g_row) in params.weights.data.iter_mut().zip(&weights_grad.data) {
                for (w, g) in w_row.iter_mut().zip(g_row) {
                    *w -= lr * g;
                }
            }
            for (b, g) in params.biases.iter_mut().zip(biases_grad) {
                *b -= lr * g;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ones_layer(size: usize, previous_size: usize, activation: ActivationFunction) -> Layer {
        let weights = Matrix::from_flat(size, previous_size, &vec![1.0; size * previous_size]).unwrap();
        Layer::with_params(weights, vec![0.0; size], activation).unwrap()
    }

    #[test]
    fn dense_layer_starts_zeroed() {
        let layer = Layer::dense(3, 2, ActivationFunction::ReLU);
        assert_eq!(layer.size, 3);
        assert!(!layer.is_input());
        let weights = layer.weights().unwrap();
        assert_eq!((weights.rows, weights.cols), (3, 2));
        assert!(weights.iter_flat().all(|w| w == 0.0));
        assert_eq!(layer.biases().unwrap(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn forward_on_input_layer_is_structural_error() {
        let mut layer = Layer::input(2);
        let err = layer.feed_from(&[1.0, 1.0]).unwrap_err();
        assert!(matches!(err, NetworkError::Structural(_)));
    }

    #[test]
    fn forward_computes_affine_then_activation() {
        let weights = Matrix::from_flat(2, 2, &[1.0, -1.0, 0.5, 0.5]).unwrap();
        let mut layer = Layer::with_params(weights, vec![0.5, -3.0], ActivationFunction::ReLU).unwrap();
        layer.feed_from(&[2.0, 1.0]).unwrap();
        assert_eq!(layer.pre_activations(), &[1.5, -1.5]);
        assert_eq!(layer.activations, vec![1.5, 0.0]);
    }

    #[test]
    fn forward_rejects_wrong_predecessor_width() {
        let mut layer = ones_layer(2, 3, ActivationFunction::Identity);
        assert!(matches!(layer.feed_from(&[1.0]), Err(NetworkError::Structural(_))));
    }

    #[test]
    fn with_params_checks_bias_length() {
        let weights = Matrix::zeros(2, 2);
        let err = Layer::with_params(weights, vec![0.0], ActivationFunction::Sigmoid).unwrap_err();
        assert!(matches!(err, NetworkError::DimensionMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn gradients_for_identity_layer() {
        let mut layer = ones_layer(1, 2, ActivationFunction::Identity);
        layer.feed_from(&[2.0, 3.0]).unwrap();
        let (w_grad, b_grad) = layer.compute_gradients(&[0.5], &[2.0, 3.0]).unwrap();
        assert_eq!(w_grad.data, vec![vec![1.0, 1.5]]);
        assert_eq!(b_grad, vec![0.5]);
        assert_eq!(layer.propagate_back(&b_grad).unwrap(), vec![0.5, 0.5]);

        layer.apply_gradients(&w_grad, &b_grad, 0.1, 0.0).unwrap();
        let updated = &layer.weights().unwrap().data[0];
        assert!((updated[0] - 0.9).abs() < 1e-12);
        assert!((updated[1] - 0.85).abs() < 1e-12);
        assert!((layer.biases().unwrap()[0] + 0.05).abs() < 1e-12);
    }

    #[test]
    fn momentum_accumulates_velocity() {
        let mut layer = ones_layer(1, 1, ActivationFunction::Identity);
        let grad = Matrix::from_flat(1, 1, &[1.0]).unwrap();
        layer.apply_gradients(&grad, &[1.0], 0.1, 0.5).unwrap();
        layer.apply_gradients(&grad, &[1.0], 0.1, 0.5).unwrap();
        // velocities 1.0 then 1.5
        let w = layer.weights().unwrap().data[0][0];
        assert!((w - (1.0 - 0.1 - 0.15)).abs() < 1e-12);
        assert!((layer.biases().unwrap()[0] + 0.25).abs() < 1e-12);
    }
}
