//! Trains a 2-4-1 network on XOR, saves it in the weight file format, loads
//! it back into a fresh network and prints the reloaded outputs.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example xor

use neverchess_ann::{
    train_loop, ActivationFunction, Network, NetworkSettings, Result, TrainConfig,
};

fn main() -> Result<()> {
    env_logger::init();

    let settings = NetworkSettings {
        input_size: 2,
        hidden_size: 4,
        output_size: 1,
        hidden_layers: 1,
        hidden_activation: ActivationFunction::Tanh,
        output_activation: ActivationFunction::Sigmoid,
        learning_rate: 0.5,
        momentum: 0.5,
    };
    let mut network = Network::from_settings(&settings)?;

    let inputs = vec![
        vec![1.0, 0.0],
        vec![1.0, 1.0],
        vec![0.0, 1.0],
        vec![0.0, 0.0],
    ];
    let expected_outputs = vec![
        vec![1.0],
        vec![0.0],
        vec![1.0],
        vec![0.0],
    ];

    let config = TrainConfig::new(5000, 1);
    let history = train_loop(&mut network, &inputs, &expected_outputs, &settings.optimizer(), &config)?;
    for stats in history.iter().step_by(1000) {
        println!("Epoch {}: loss = {:.6}", stats.epoch, stats.train_loss);
    }

    let path = std::env::temp_dir().join("xor.ann");
    network.save_file(&path)?;

    let mut reloaded = Network::new();
    reloaded.load_file_with(&path, settings.hidden_activation, settings.output_activation)?;
    for input in &inputs {
        println!("Input: {:?} -> Output: {:.4}", input, reloaded.infer(input)?[0]);
    }
    Ok(())
}
