//! # Error Types
//!
//! Every failure in this crate is an input-validation failure detected before
//! any arithmetic runs. There are no transient errors.

use std::error::Error;
use std::fmt;

/// Errors raised by blocks, parameter buffers and the KL loss evaluator
#[derive(Debug, Clone, PartialEq)]
pub enum KlError {
    /// Shard or block shape inconsistent with its declared dimensions
    ShapeMismatch(String),
    /// Parameter buffer length differs from the required k×n
    DimensionMismatch { expected: usize, actual: usize },
    /// Flat or (row, col) access outside the valid range
    IndexOutOfRange { index: usize, len: usize },
    /// Smoothing constant must be finite and strictly positive
    InvalidSmoothing(f64),
    InvalidConfiguration(String),
}

impl fmt::Display for KlError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KlError::ShapeMismatch(msg) => write!(f, "Shape mismatch: {}", msg),
            KlError::DimensionMismatch { expected, actual } => write!(
                f,
                "Dimension mismatch: expected buffer of length {}, got {}",
                expected, actual
            ),
            KlError::IndexOutOfRange { index, len } => {
                write!(f, "Index {} out of range for length {}", index, len)
            }
            KlError::InvalidSmoothing(eps) => {
                write!(f, "Invalid smoothing constant {} (must be finite and > 0)", eps)
            }
            KlError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl Error for KlError {}

pub type Result<T> = std::result::Result<T, KlError>;
