//! Audit error types.

use thiserror::Error;

/// Audit errors
#[derive(Debug, Error)]
pub enum AuditError {
    /// Stored chain does not match recomputed hashes
    #[error("Audit chain integrity violation at sequence {sequence}: {reason}")]
    Integrity { sequence: u64, reason: String },

    /// Event not found
    #[error("Audit event not found: {0}")]
    NotFound(u64),

    /// Work did not finish before its deadline
    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(std::time::Duration),

    /// Export failed
    #[error("Export failed: {0}")]
    Export(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] warden_storage::StorageError),
}

/// Result type for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;
