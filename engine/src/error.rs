//! Error types for the sync engine.

use thiserror::Error;

/// All possible errors from the sync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid remote tree: {0}")]
    InvalidTree(String),

    #[error("invalid row in {table}: {reason}")]
    InvalidRow { table: String, reason: String },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
