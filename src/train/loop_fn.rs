use std::time::Instant;

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::{NetworkError, Result};
use crate::math::matrix::Matrix;
use crate::network::network::Network;
use crate::optim::sgd::Sgd;
use crate::train::epoch_stats::EpochStats;
use crate::train::train_config::TrainConfig;

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Trains `network` for `config.epochs` epochs and returns the statistics
/// of every completed epoch.
///
/// # Errors
/// Fails if the data set is empty, inputs and labels differ in count,
/// `batch_size == 0`, or any sample has the wrong dimensions. Batches
/// applied before the failing sample stay applied.
pub fn train_loop(
    network: &mut Network,
    inputs: &[Vec<f64>],
    labels: &[Vec<f64>],
    optimizer: &Sgd,
    config: &TrainConfig,
) -> Result<Vec<EpochStats>> {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut history = Vec::with_capacity(config.epochs);
    for epoch in 1..=config.epochs {
        let t_start = Instant::now();

        let mut order: Vec<usize> = (0..inputs.len()).collect();
        if config.shuffle {
            order.shuffle(&mut rng);
        }
        let train_loss = run_batches(network, inputs, labels, &order, optimizer, config.batch_size)?;

        let stats = EpochStats {
            epoch,
            total_epochs: config.epochs,
            train_loss,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };
        debug!("epoch {}/{}: loss = {:.6} ({} ms)", epoch, config.epochs, train_loss, stats.elapsed_ms);
        history.push(stats);
    }

    Ok(history)
}

/// Runs one shuffled epoch of mini-batch SGD and returns the mean squared
/// error per sample.
pub fn train_epoch<R: Rng + ?Sized>(
    network: &mut Network,
    inputs: &[Vec<f64>],
    labels: &[Vec<f64>],
    optimizer: &Sgd,
    batch_size: usize,
    rng: &mut R,
) -> Result<f64> {
    let mut order: Vec<usize> = (0..inputs.len()).collect();
    order.shuffle(rng);
    run_batches(network, inputs, labels, &order, optimizer, batch_size)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn check_data(inputs: &[Vec<f64>], labels: &[Vec<f64>], batch_size: usize) -> Result<()> {
    if inputs.is_empty() {
        return Err(NetworkError::InvalidSettings("training set is empty".into()));
    }
    if inputs.len() != labels.len() {
        return Err(NetworkError::DimensionMismatch {
            expected: inputs.len(),
            actual: labels.len(),
        });
    }
    if batch_size == 0 {
        return Err(NetworkError::InvalidSettings("batch_size must be at least 1".into()));
    }
    Ok(())
}

/// Visits samples in `order`, averaging gradients over each batch before
/// applying them.
fn run_batches(
    network: &mut Network,
    inputs: &[Vec<f64>],
    labels: &[Vec<f64>],
    order: &[usize],
    optimizer: &Sgd,
    batch_size: usize,
) -> Result<f64> {
    check_data(inputs, labels, batch_size)?;
    let mut total_loss = 0.0;

    for batch in order.chunks(batch_size) {
        let mut acc: Option<Vec<(Matrix, Vec<f64>)>> = None;

        for &idx in batch {
            let (loss, grads) = network.gradients(&inputs[idx], &labels[idx])?;
            total_loss += loss;
            acc = Some(match acc.take() {
                None => grads,
                Some(mut sum) => {
                    accumulate(&mut sum, &grads);
                    sum
                }
            });
        }

        if let Some(mut acc) = acc {
            let inv_batch = 1.0 / batch.len() as f64;
            for (w_acc, b_acc) in acc.iter_mut() {
                w_acc.data.iter_mut().flatten().for_each(|g| *g *= inv_batch);
                b_acc.iter_mut().for_each(|g| *g *= inv_batch);
            }
            network.apply_gradients(&acc, optimizer)?;
        }
    }

    Ok(total_loss / inputs.len() as f64)
}

fn accumulate(acc: &mut [(Matrix, Vec<f64>)], grads: &[(Matrix, Vec<f64>)]) {
    for ((w_acc, b_acc), (w_grad, b_grad)) in acc.iter_mut().zip(grads) {
        for (acc_row, grad_row) in w_acc.data.iter_mut().zip(&w_grad.data) {
            for (a, g) in acc_row.iter_mut().zip(grad_row) {
                *a += g;
            }
        }
        for (a, g) in b_acc.iter_mut().zip(b_grad) {
            *a += g;
        }
    }
}
