//! Error types shared by the workbench crates.

use thiserror::Error;

/// Top-level error type for workbench operations that touch the outside
/// world (files, persisted blobs).
#[derive(Debug, Error)]
pub enum WorkbenchError {
    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema version mismatch
    #[error("Schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Expected version
        expected: String,
        /// Actual version found
        actual: String,
    },

    /// Persisted data is not in the expected format
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for workbench operations.
pub type WorkbenchResult<T> = Result<T, WorkbenchError>;
