use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::codec::weight_file::Topology;
use crate::error::{NetworkError, Result};
use crate::optim::sgd::Sgd;

/// Upper bound on any single layer width or the hidden layer count.
pub const MAX_DIMENSION: usize = 1 << 16;

/// Architecture and training hyperparameters for a freshly initialised
/// network.
///
/// Fields:
/// - `input_size`, `hidden_size`, `output_size` — neuron counts; every
///   hidden layer has `hidden_size` neurons
/// - `hidden_layers`     — number of hidden layers (at least 1)
/// - `hidden_activation` — activation for every hidden layer
/// - `output_activation` — activation for the output layer
/// - `learning_rate`     — SGD step size
/// - `momentum`          — in [0, 1); 0 disables momentum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    pub hidden_layers: usize,
    pub hidden_activation: ActivationFunction,
    pub output_activation: ActivationFunction,
    pub learning_rate: f64,
    pub momentum: f64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        NetworkSettings {
            input_size: 1,
            hidden_size: 1,
            output_size: 1,
            hidden_layers: 1,
            hidden_activation: ActivationFunction::ReLU,
            output_activation: ActivationFunction::Sigmoid,
            learning_rate: 0.1,
            momentum: 0.0,
        }
    }
}

impl NetworkSettings {
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("input_size", self.input_size),
            ("hidden_size", self.hidden_size),
            ("output_size", self.output_size),
            ("hidden_layers", self.hidden_layers),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, n)| *n == 0) {
            return Err(NetworkError::InvalidSettings(format!("{name} must be at least 1")));
        }
        if let Some((name, n)) = sizes.iter().find(|(_, n)| *n > MAX_DIMENSION) {
            return Err(NetworkError::InvalidSettings(format!(
                "{name} is {n}, above the limit of {MAX_DIMENSION}"
            )));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(NetworkError::InvalidSettings(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(NetworkError::InvalidSettings(format!(
                "momentum must be in [0, 1), got {}",
                self.momentum
            )));
        }
        Ok(())
    }

    pub fn topology(&self) -> Topology {
        Topology {
            input_size: self.input_size,
            hidden_size: self.hidden_size,
            output_size: self.output_size,
            hidden_layers: self.hidden_layers,
        }
    }

    pub fn optimizer(&self) -> Sgd {
        Sgd::with_momentum(self.learning_rate, self.momentum)
    }

    /// Serializes the settings to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes and validates settings from a JSON file. Missing fields
    /// take their default values.
    pub fn load_json(path: &str) -> Result<NetworkSettings> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let settings: NetworkSettings = serde_json::from_reader(reader)?;
        settings.validate()?;
        Ok(settings)
    }
}
