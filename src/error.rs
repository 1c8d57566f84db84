//! Error module for the SRM SNN library.
use std::error::Error;
use std::fmt;

/// Error types for the library.
#[derive(Debug, PartialEq, Clone)]
pub enum SnnError {
    /// Error for a required configuration key that is absent from the parameter store.
    MissingParameter(String),
    /// Error for a configuration value that is present but unusable, e.g., a non-positive time step.
    InvalidParameter(String),
    /// Error for tensor dimension mismatch between an operand and what the operation expects.
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    /// Error for operations applied in an invalid order, e.g., backward without a forward pass.
    InvalidOperation(String),
    /// Error for I/O operations.
    IOError(String),
}

impl fmt::Display for SnnError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SnnError::MissingParameter(key) => {
                write!(f, "Missing configuration parameter: {}", key)
            }
            SnnError::InvalidParameter(e) => write!(f, "Invalid parameter: {}", e),
            SnnError::ShapeMismatch { expected, actual } => write!(
                f,
                "Shape mismatch: expected {:?}, got {:?}",
                expected, actual
            ),
            SnnError::InvalidOperation(e) => write!(f, "Invalid operation: {}", e),
            SnnError::IOError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl Error for SnnError {}
