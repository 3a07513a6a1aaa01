pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod codec;
pub mod loss;
pub mod optim;
pub mod train;
pub mod error;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use activation::activation::{ActivationFunction, MathBackend, StdMath};
pub use layers::dense::Layer;
pub use network::network::Network;
pub use network::settings::NetworkSettings;
pub use codec::weight_file::Topology;
pub use loss::mse::MseLoss;
pub use optim::sgd::Sgd;
pub use train::{train_epoch, train_loop, TrainConfig, EpochStats};
pub use error::{FormatError, NetworkError, Result};
