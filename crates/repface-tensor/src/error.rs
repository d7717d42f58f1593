//! Error Types - Tensor and Model Error Handling
//!
//! Defines the error enum shared across the RepFace crates together with a
//! `Result` alias and convenience constructors. Tensor operations report
//! recoverable misuse through these variants; structural preconditions in
//! the fusion algebra are programmer errors and assert instead.
//!
//! @version 0.1.0
//! @author `RepFace` Development Team

use thiserror::Error;

// =============================================================================
// Error Enum
// =============================================================================

/// Errors produced by tensor operations and model factories.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Shape mismatch between expected and actual.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// The shape that was expected.
        expected: Vec<usize>,
        /// The shape that was received.
        got: Vec<usize>,
    },

    /// Index out of bounds for a dimension.
    #[error("Index {index} out of bounds for dimension of size {size}")]
    IndexOutOfBounds {
        /// The offending index.
        index: usize,
        /// The size of the dimension.
        size: usize,
    },

    /// Dimension index out of range for the tensor rank.
    #[error("Invalid dimension {index} for tensor with {ndim} dimensions")]
    InvalidDimension {
        /// The requested dimension.
        index: i64,
        /// Number of dimensions the tensor has.
        ndim: usize,
    },

    /// Operation not valid for the given operands.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Requested model name is not registered with the factory.
    #[error("Unknown model: {0}")]
    UnknownModel(String),
}

impl Error {
    /// Creates a shape mismatch error.
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }
}

/// Result type alias using the shared [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_display() {
        let err = Error::shape_mismatch(&[2, 3], &[3, 2]);
        let msg = err.to_string();
        assert!(msg.contains("[2, 3]"));
        assert!(msg.contains("[3, 2]"));
    }

    #[test]
    fn test_invalid_operation_display() {
        let err = Error::invalid_operation("matmul requires 2D tensors");
        assert_eq!(
            err.to_string(),
            "Invalid operation: matmul requires 2D tensors"
        );
    }

    #[test]
    fn test_unknown_model_display() {
        let err = Error::UnknownModel("repvit_m9_0".to_string());
        assert_eq!(err.to_string(), "Unknown model: repvit_m9_0");
    }
}
