pub mod network;
pub mod settings;

pub use network::Network;
pub use settings::NetworkSettings;
