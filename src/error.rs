use std::any::Any;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the forecasting core.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("registry file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("artifact encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("matrix shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("historical data is missing required column `{0}`")]
    MissingColumn(String),

    #[error("cannot parse timestamp `{value}` on line {line}")]
    Timestamp { value: String, line: u64 },

    #[error("cannot parse temperature `{value}` on line {line}")]
    Temperature { value: String, line: u64 },

    #[error("need at least {needed} monthly samples to train, got {found}")]
    InsufficientData { needed: usize, found: usize },

    #[error("model file not found for `{0}`")]
    ModelFileNotFound(String),

    #[error("unknown model `{0}`")]
    UnknownModel(String),

    #[error("the built-in model `{0}` cannot be renamed or removed")]
    ReservedModel(String),

    #[error("model `{0}` has not been trained")]
    Untrained(String),

    #[error("training cancelled")]
    Cancelled,

    #[error("training thread failed: {0}")]
    Worker(String),

    #[error("network expects {inputs} inputs and {outputs} outputs, need 2 and 1")]
    IncompatibleModel { inputs: usize, outputs: usize },

    #[error("cannot render chart {path}: {message}")]
    Plot { path: PathBuf, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ForecastError>;

/// Text of a panic payload caught by `catch_unwind` or `JoinHandle::join`.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
