use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::{debug, info};
use rand::Rng;

use crate::{
    activation::activation::ActivationFunction,
    codec::weight_file::{read_weights, write_weights, Topology},
    error::{NetworkError, Result},
    layers::dense::Layer,
    loss::mse::MseLoss,
    math::matrix::Matrix,
    network::settings::NetworkSettings,
    optim::sgd::Sgd,
};

/// Per-layer gradients for every non-input layer, in chain order.
pub type Gradients = Vec<(Matrix, Vec<f64>)>;

/// Feedforward network: an input layer, one or more hidden layers and an
/// output layer.
///
/// The network owns its layers outright; a layer's predecessor and
/// successor are its index neighbours. Activations are overwritten in place
/// on every call, so a single instance must not be shared between threads
/// without synchronisation. Clone it for concurrent evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Network {
    layers: Vec<Layer>,
}

impl Network {
    /// Empty network; load a weight file before inferring.
    pub fn new() -> Network {
        Network { layers: Vec::new() }
    }

    /// Builds a randomly initialised network from `settings`.
    pub fn from_settings(settings: &NetworkSettings) -> Result<Network> {
        Network::from_settings_with_rng(settings, &mut rand::thread_rng())
    }

    pub fn from_settings_with_rng<R: Rng + ?Sized>(settings: &NetworkSettings, rng: &mut R) -> Result<Network> {
        settings.validate()?;
        let sizes = settings.topology().layer_sizes();
        let last = sizes.len() - 1;

        let mut layers = Vec::with_capacity(sizes.len());
        layers.push(Layer::input(settings.input_size));
        for (i, pair) in sizes.windows(2).enumerate() {
            let activation = if i + 1 == last {
                settings.output_activation
            } else {
                settings.hidden_activation
            };
            layers.push(Layer::random(pair[1], pair[0], activation, rng));
        }
        Ok(Network { layers })
    }

    /// Assembles a network from an explicit layer chain.
    pub fn from_layers(layers: Vec<Layer>) -> Result<Network> {
        Topology::from_layers(&layers)?;
        Ok(Network { layers })
    }

    /// Loads a weight file with ReLU hidden layers and a Sigmoid output.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<Topology> {
        self.load_file_with(path, ActivationFunction::ReLU, ActivationFunction::Sigmoid)
    }

    /// Loads a weight file, replacing the current chain only on success.
    pub fn load_file_with<P: AsRef<Path>>(
        &mut self,
        path: P,
        hidden: ActivationFunction,
        output: ActivationFunction,
    ) -> Result<Topology> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let topology = self.read_from(BufReader::new(file), hidden, output)?;
        info!(
            "loaded {}: {} inputs, {} x {} hidden, {} outputs",
            path.display(),
            topology.input_size,
            topology.hidden_layers,
            topology.hidden_size,
            topology.output_size
        );
        Ok(topology)
    }

    /// Reads the weight file format from any buffered reader.
    pub fn read_from<R: BufRead>(
        &mut self,
        reader: R,
        hidden: ActivationFunction,
        output: ActivationFunction,
    ) -> Result<Topology> {
        let (topology, layers) = read_weights(reader, hidden, output)?;
        self.layers = layers;
        Ok(topology)
    }

    /// Writes the weights and biases in the weight file format.
    ///
    /// The chain is validated before `path` is opened, so an empty or
    /// malformed network never truncates an existing file.
    pub fn save_file<P: AsRef<Path>>(&self, path: P) -> Result<Topology> {
        let path = path.as_ref();
        self.topology()?;
        let file = File::create(path)?;
        let topology = self.write_to(BufWriter::new(file))?;
        info!("saved {} ({} layers)", path.display(), self.layers.len());
        Ok(topology)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<Topology> {
        write_weights(&self.layers, writer)
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn input_layer(&self) -> Option<&Layer> {
        self.layers.first()
    }

    pub fn output_layer(&self) -> Option<&Layer> {
        self.layers.last()
    }

    pub fn topology(&self) -> Result<Topology> {
        Topology::from_layers(&self.layers)
    }

    /// Forward pass. Returns a copy of the output activations.
    pub fn infer(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        let input_layer = self.layers.first_mut().ok_or(NetworkError::EmptyNetwork)?;
        input_layer.set_activations(input)?;

        for i in 1..self.layers.len() {
            let (done, rest) = self.layers.split_at_mut(i);
            rest[0].feed_from(&done[i - 1].activations)?;
        }

        self.output_layer()
            .map(|layer| layer.activations.clone())
            .ok_or(NetworkError::EmptyNetwork)
    }

    /// Runs a forward pass, then backpropagates squared error.
    ///
    /// Returns Σ(output - target)² measured before any update, together with
    /// the gradients of every non-input layer. Every delta is computed from
    /// the current weights.
    pub fn gradients(&mut self, input: &[f64], target: &[f64]) -> Result<(f64, Gradients)> {
        let output = self.infer(input)?;
        if target.len() != output.len() {
            return Err(NetworkError::DimensionMismatch {
                expected: output.len(),
                actual: target.len(),
            });
        }

        let loss = MseLoss::sum_squared(&output, target);
        let mut error = MseLoss::derivative(&output, target);
        let mut grads = Vec::with_capacity(self.layers.len() - 1);

        for i in (1..self.layers.len()).rev() {
            let layer = &self.layers[i];
            let (w_grad, b_grad) = layer.compute_gradients(&error, &self.layers[i - 1].activations)?;
            if i > 1 {
                error = layer.propagate_back(&b_grad)?;
            }
            grads.push((w_grad, b_grad));
        }
        grads.reverse();

        Ok((loss, grads))
    }

    /// Applies gradients produced by `gradients` (or an average of several).
    ///
    /// Every shape is checked before the first layer is stepped; on error
    /// the network is unchanged.
    pub fn apply_gradients(&mut self, grads: &[(Matrix, Vec<f64>)], optimizer: &Sgd) -> Result<()> {
        if grads.len() + 1 != self.layers.len() {
            return Err(NetworkError::Structural(format!(
                "{} gradient sets for {} trainable layers",
                grads.len(),
                self.layers.len().saturating_sub(1)
            )));
        }
        for (i, (layer, (w_grad, b_grad))) in self.layers.iter().skip(1).zip(grads).enumerate() {
            let fits = match (layer.weights(), layer.biases()) {
                (Some(w), Some(b)) => {
                    w.rows == w_grad.rows
                        && w.cols == w_grad.cols
                        && w_grad.data.len() == w_grad.rows
                        && w_grad.data.iter().all(|row| row.len() == w_grad.cols)
                        && b.len() == b_grad.len()
                }
                _ => false,
            };
            if !fits {
                return Err(NetworkError::Structural(format!(
                    "gradient shape does not match layer {}",
                    i + 1
                )));
            }
        }
        for (layer, (w_grad, b_grad)) in self.layers.iter_mut().skip(1).zip(grads) {
            optimizer.step(layer, w_grad, b_grad)?;
        }
        Ok(())
    }

    /// One step of gradient descent on a single sample.
    ///
    /// Returns the squared error measured before the update.
    pub fn train_step(&mut self, input: &[f64], target: &[f64], learning_rate: f64) -> Result<f64> {
        if !(learning_rate.is_finite() && learning_rate > 0.0) {
            return Err(NetworkError::InvalidSettings(format!(
                "learning rate must be positive, got {learning_rate}"
            )));
        }
        self.train_step_with(input, target, &Sgd::new(learning_rate))
    }

    pub fn train_step_with(&mut self, input: &[f64], target: &[f64], optimizer: &Sgd) -> Result<f64> {
        let (loss, grads) = self.gradients(input, target)?;
        self.apply_gradients(&grads, optimizer)?;
        debug!("train step: squared error {loss:.6}");
        Ok(loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    /// 2-3-2 network with every weight 1.0 and every bias 0.0.
    fn ones_2_3_2() -> String {
        let mut lines = vec!["2", "3", "2", "1"];
        lines.extend(std::iter::repeat("1.0").take(6 + 6));
        lines.extend(std::iter::repeat("0.0").take(3 + 2));
        lines.join("\n") + "\n"
    }

    fn load(text: &str) -> Network {
        let mut network = Network::new();
        network
            .read_from(text.as_bytes(), ActivationFunction::ReLU, ActivationFunction::Sigmoid)
            .unwrap();
        network
    }

    #[test]
    fn all_ones_network_matches_hand_computation() {
        let mut network = load(&ones_2_3_2());
        let output = network.infer(&[1.0, 1.0]).unwrap();

        let hidden = &network.layers()[1];
        assert_eq!(hidden.pre_activations(), &[2.0, 2.0, 2.0]);
        assert_eq!(hidden.activations, vec![2.0, 2.0, 2.0]);
        assert_eq!(network.output_layer().unwrap().pre_activations(), &[6.0, 6.0]);

        let expected = 1.0 / (1.0 + (-6.0f64).exp());
        assert_eq!(output, vec![expected, expected]);
        assert!((output[0] - 0.9975).abs() < 1e-4);
    }

    #[test]
    fn zero_network_outputs_activation_of_zero() {
        let mut network = Network::new();
        network.layers = vec![
            Layer::input(4),
            Layer::dense(5, 4, ActivationFunction::ReLU),
            Layer::dense(3, 5, ActivationFunction::Sigmoid),
        ];
        for input in [[0.0; 4], [1.0, -2.0, 3.0, 100.0]] {
            assert_eq!(network.infer(&input).unwrap(), vec![0.5; 3]);
        }
    }

    #[test]
    fn infer_is_deterministic() {
        let settings = NetworkSettings {
            input_size: 6,
            hidden_size: 8,
            hidden_layers: 3,
            output_size: 2,
            ..Default::default()
        };
        let mut network = Network::from_settings_with_rng(&settings, &mut StdRng::seed_from_u64(3)).unwrap();
        let input = [0.3, -0.1, 0.9, 0.0, 1.0, -0.7];
        let first = network.infer(&input).unwrap();
        let second = network.infer(&input).unwrap();
        assert_eq!(first.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
                   second.iter().map(|v| v.to_bits()).collect::<Vec<_>>());
    }

    #[test]
    fn infer_rejects_wrong_input_length() {
        let mut network = load(&ones_2_3_2());
        let before = network.clone();
        let err = network.infer(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, NetworkError::DimensionMismatch { expected: 2, actual: 3 }));
        assert_eq!(network, before);
    }

    #[test]
    fn infer_on_empty_network_fails() {
        let mut network = Network::new();
        assert!(network.is_empty());
        assert!(matches!(network.infer(&[1.0]), Err(NetworkError::EmptyNetwork)));
    }

    #[test]
    fn failed_load_keeps_previous_network() {
        let mut network = load(&ones_2_3_2());
        let before = network.clone();
        let bad = "2\n3\n2\n0\n";
        let err = network
            .read_from(bad.as_bytes(), ActivationFunction::ReLU, ActivationFunction::Sigmoid)
            .unwrap_err();
        assert!(matches!(err, NetworkError::Format(_)));
        assert_eq!(network, before);
    }

    #[test]
    fn from_settings_builds_requested_chain() {
        let settings = NetworkSettings {
            input_size: 3,
            hidden_size: 4,
            output_size: 2,
            hidden_layers: 2,
            hidden_activation: ActivationFunction::Tanh,
            ..Default::default()
        };
        let network = Network::from_settings(&settings).unwrap();
        assert_eq!(network.topology().unwrap(), settings.topology());
        let activators: Vec<_> = network.layers().iter().map(Layer::activator).collect();
        assert_eq!(activators, vec![
            None,
            Some(ActivationFunction::Tanh),
            Some(ActivationFunction::Tanh),
            Some(ActivationFunction::Sigmoid),
        ]);
        assert!(network.input_layer().unwrap().is_input());
    }

    #[test]
    fn train_step_strictly_decreases_error() {
        let settings = NetworkSettings {
            input_size: 2,
            hidden_size: 3,
            output_size: 1,
            hidden_activation: ActivationFunction::Tanh,
            ..Default::default()
        };
        let mut network = Network::from_settings_with_rng(&settings, &mut StdRng::seed_from_u64(11)).unwrap();
        let (input, target) = ([0.5, -0.25], [0.9]);

        let mut previous = f64::INFINITY;
        for _ in 0..50 {
            let loss = network.train_step(&input, &target, 0.1).unwrap();
            assert!(loss < previous, "loss went from {previous} to {loss}");
            previous = loss;
        }
    }

    #[test]
    fn train_step_matches_manual_update() {
        // 1-1-1 identity network: y = w2 * (w1 * x + b1) + b2
        let layers = vec![
            Layer::input(1),
            Layer::with_params(Matrix::from_flat(1, 1, &[0.5]).unwrap(), vec![0.0], ActivationFunction::Identity).unwrap(),
            Layer::with_params(Matrix::from_flat(1, 1, &[2.0]).unwrap(), vec![1.0], ActivationFunction::Identity).unwrap(),
        ];
        let mut network = Network::from_layers(layers).unwrap();
        // y = 2 * 1 + 1 = 3, target 1 -> output delta 2, hidden delta 2 * 2 = 4
        let loss = network.train_step(&[2.0], &[1.0], 0.5).unwrap();
        assert_eq!(loss, 4.0);

        let hidden = &network.layers()[1];
        let output = &network.layers()[2];
        assert_eq!(output.weights().unwrap().data[0][0], 2.0 - 0.5 * 2.0 * 1.0);
        assert_eq!(output.biases().unwrap()[0], 1.0 - 0.5 * 2.0);
        assert_eq!(hidden.weights().unwrap().data[0][0], 0.5 - 0.5 * 4.0 * 2.0);
        assert_eq!(hidden.biases().unwrap()[0], -0.5 * 4.0);
    }

    fn identity_layer(weight: f64) -> Layer {
        Layer::with_params(Matrix::from_flat(1, 1, &[weight]).unwrap(), vec![0.0], ActivationFunction::Identity).unwrap()
    }

    #[test]
    fn gradients_flow_through_stacked_hidden_layers() {
        // 1-1-1-1 identity chain: h1 = 0.5x, h2 = 2h1, y = 3h2
        let layers = vec![Layer::input(1), identity_layer(0.5), identity_layer(2.0), identity_layer(3.0)];
        let mut network = Network::from_layers(layers).unwrap();
        let (loss, grads) = network.gradients(&[1.0], &[1.0]).unwrap();

        // y = 3, error 2; hidden errors 3 * 2 = 6 and 2 * 6 = 12
        assert_eq!(loss, 4.0);
        let weight_grads: Vec<f64> = grads.iter().map(|(w, _)| w.data[0][0]).collect();
        let bias_grads: Vec<f64> = grads.iter().map(|(_, b)| b[0]).collect();
        assert_eq!(weight_grads, vec![12.0, 3.0, 2.0]);
        assert_eq!(bias_grads, vec![12.0, 6.0, 2.0]);
    }

    #[test]
    fn gradients_match_finite_differences() {
        let settings = NetworkSettings {
            input_size: 3,
            hidden_size: 4,
            output_size: 2,
            hidden_layers: 3,
            hidden_activation: ActivationFunction::Tanh,
            ..Default::default()
        };
        let mut network = Network::from_settings_with_rng(&settings, &mut StdRng::seed_from_u64(21)).unwrap();
        let (input, target) = ([0.4, -0.7, 0.2], [0.1, 0.8]);
        let (_, grads) = network.gradients(&input, &target).unwrap();

        // gradients are of ½Σ(y - t)²
        let half_loss = |layers: Vec<Layer>| {
            let mut net = Network::from_layers(layers).unwrap();
            let out = net.infer(&input).unwrap();
            0.5 * MseLoss::sum_squared(&out, &target)
        };
        let eps = 1e-6;
        for (l, (w_grad, _)) in grads.iter().enumerate() {
            let layer = &network.layers()[l + 1];
            let params = layer.params().unwrap();
            for i in 0..params.weights.rows {
                for j in 0..params.weights.cols {
                    let nudged = |delta: f64| {
                        let mut weights = params.weights.clone();
                        weights.data[i][j] += delta;
                        let mut layers = network.layers().to_vec();
                        layers[l + 1] = Layer::with_params(weights, params.biases.clone(), params.activator).unwrap();
                        half_loss(layers)
                    };
                    let numeric = (nudged(eps) - nudged(-eps)) / (2.0 * eps);
                    assert!(
                        (numeric - w_grad.data[i][j]).abs() < 1e-7,
                        "layer {} weight ({i}, {j}): numeric {numeric}, analytic {}",
                        l + 1,
                        w_grad.data[i][j]
                    );
                }
            }
        }
    }

    #[test]
    fn rejected_gradients_leave_network_unchanged() {
        let settings = NetworkSettings {
            input_size: 2,
            hidden_size: 3,
            output_size: 2,
            hidden_layers: 2,
            ..Default::default()
        };
        let mut network = Network::from_settings_with_rng(&settings, &mut StdRng::seed_from_u64(8)).unwrap();
        let (_, mut grads) = network.gradients(&[0.5, 0.5], &[1.0, 0.0]).unwrap();
        let before = network.clone();

        grads.last_mut().unwrap().1.push(1.0);
        let err = network.apply_gradients(&grads, &Sgd::new(0.1)).unwrap_err();
        assert!(matches!(err, NetworkError::Structural(_)));
        assert_eq!(network, before);
    }

    #[test]
    fn train_step_validates_arguments() {
        let mut network = load(&ones_2_3_2());
        assert!(matches!(
            network.train_step(&[1.0, 1.0], &[1.0], 0.1),
            Err(NetworkError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            network.train_step(&[1.0, 1.0], &[1.0, 0.0], 0.0),
            Err(NetworkError::InvalidSettings(_))
        ));
    }

    #[test]
    fn from_layers_rejects_missing_hidden_layer() {
        let layers = vec![Layer::input(2), Layer::dense(1, 2, ActivationFunction::Sigmoid)];
        assert!(matches!(Network::from_layers(layers), Err(NetworkError::Structural(_))));
    }
}
