use thiserror::Error;

/// Problems found while parsing a weight file.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("weight file truncated: expected {expected} lines, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("line {line}: expected a number, found {token:?}")]
    NotANumber { line: usize, token: String },

    #[error("invalid {field}: {value} (must be a positive integer)")]
    InvalidDimension { field: &'static str, value: i64 },

    #[error("a network needs at least one hidden layer")]
    NoHiddenLayers,
}

/// Errors surfaced by the network engine.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("malformed weight file: {0}")]
    Format(#[from] FormatError),

    #[error("dimension mismatch: expected {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Engine invariant violated (e.g. forward pass on the input layer).
    #[error("structural error: {0}")]
    Structural(String),

    #[error("network has no layers loaded")]
    EmptyNetwork,

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings serialization error: {0}")]
    Settings(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NetworkError>;
