//! Error types for the LBVH library.

use thiserror::Error;

/// Main error type for build, query and serialization operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Primitive count exceeds the preallocated storage
    #[error("Capacity exceeded: {requested} primitives requested, capacity is {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },

    /// Input geometry is malformed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialized tree words do not describe a valid tree
    #[error("Invalid tree format: {0}")]
    InvalidFormat(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid input error.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an invalid format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }
}

/// Result type alias for LBVH operations.
pub type Result<T> = std::result::Result<T, Error>;
