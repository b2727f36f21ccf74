//! Error types for CutScope.

use thiserror::Error;

/// Main error type for core and GPU operations.
#[derive(Error, Debug)]
pub enum CutScopeError {
    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CutScopeError {
    /// Whether this error means the GPU (or its stand-in) ran out of room.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory(_))
    }
}

/// Result type alias for CutScope operations.
pub type Result<T> = std::result::Result<T, CutScopeError>;
