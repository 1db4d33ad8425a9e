use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CqLensError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Records out of order: record {index} at {timestamp} precedes {previous}")]
    OutOfOrder {
        index: usize,
        timestamp: DateTime<Utc>,
        previous: DateTime<Utc>,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CqLensError>;
