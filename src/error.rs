//! Error types for model construction and classification.
//!
//! Hard failures (bad input, corrupt model files, invalid indices) surface as
//! [`TdeError`]. Degraded matches during classification are never errors;
//! they are logged and scoring continues with whatever neighbours were found.

use thiserror::Error;

/// Main error type for embedding, model and classifier operations.
#[derive(Error, Debug)]
pub enum TdeError {
    /// Input is shorter than the embedding history it needs.
    #[error("Insufficient data: need {required} samples, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// A model or index dump could not be parsed.
    #[error("Corrupt model: {0}")]
    CorruptModel(String),

    /// A point index past the end of a model was requested.
    #[error("Index {index} out of range for model with {len} points")]
    IndexOutOfRange { index: usize, len: usize },

    /// Vector or matrix widths disagree.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Configuration validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input validation errors.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Linear algebra computation failed.
    #[error("Linear algebra error: {0}")]
    LinalgError(String),

    /// File access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for time-delay embedding operations.
pub type Result<T> = std::result::Result<T, TdeError>;

impl TdeError {
    /// Create an insufficient data error.
    #[must_use]
    pub const fn insufficient_data(required: usize, actual: usize) -> Self {
        Self::InsufficientData { required, actual }
    }

    /// Create a corrupt model error.
    #[must_use]
    pub fn corrupt_model(msg: impl Into<String>) -> Self {
        Self::CorruptModel(msg.into())
    }

    /// Create an index out of range error.
    #[must_use]
    pub const fn index_out_of_range(index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { index, len }
    }

    /// Create a dimension mismatch error.
    #[must_use]
    pub const fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a linear algebra error.
    #[must_use]
    pub fn linalg(msg: impl Into<String>) -> Self {
        Self::LinalgError(msg.into())
    }
}
