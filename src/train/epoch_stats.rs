use serde::{Serialize, Deserialize};

/// Statistics for one completed epoch of `train_loop`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    pub total_epochs: usize,
    /// Mean squared error per sample, measured before each batch update.
    pub train_loss: f64,
    pub elapsed_ms: u64,
}
