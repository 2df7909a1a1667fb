//! Error types for bdelta operations.

use std::fmt;

/// Result type for bdelta operations.
pub type Result<T> = std::result::Result<T, BDeltaError>;

/// Errors that can occur while configuring or driving the engine.
///
/// Match discovery itself is total over valid inputs: once an instance
/// is constructed and a pass accepted, the algorithm always terminates
/// and never fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BDeltaError {
    /// A runtime-negotiated token width does not match the compiled
    /// token type.
    TokenSizeMismatch {
        /// Width of the compiled token type in bytes.
        expected: usize,
        /// Width the caller asked for.
        actual: usize,
    },

    /// A pass was requested with a blocksize of zero.
    InvalidBlockSize,
}

impl fmt::Display for BDeltaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BDeltaError::TokenSizeMismatch { expected, actual } => {
                write!(
                    f,
                    "engine compiled for a token size of {} bytes, got {}",
                    expected, actual
                )
            }
            BDeltaError::InvalidBlockSize => write!(f, "pass blocksize must be nonzero"),
        }
    }
}

impl std::error::Error for BDeltaError {}
