//! Core error types for the mnemo forensic tool.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed on-disk structure (bad signature, length overflow, fixup
    /// mismatch)
    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    /// Offset is out of bounds for the source
    #[error("Offset {offset} is out of bounds (max: {max})")]
    OutOfBounds { offset: u64, max: u64 },

    /// Artifact or file not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Required capability is not available in this build or format revision
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
