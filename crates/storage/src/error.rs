//! Storage error types.

use thiserror::Error;

/// Block storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("block not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt block {cid}: {reason}")]
    Corrupt { cid: String, reason: String },

    #[error("staging area not found: {0}")]
    StagingNotFound(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
