//! Role engine error types.

use thiserror::Error;
use uuid::Uuid;

/// Role engine errors
#[derive(Debug, Error)]
pub enum RoleError {
    /// Caller may not perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Duplicate request, repeated vote or an already decided request
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The operation can never succeed for this target
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Promotion request not found
    #[error("Promotion request not found: {0}")]
    NotFound(Uuid),

    /// Identity error
    #[error("Identity error: {0}")]
    Identity(#[from] warden_identity::IdentityError),

    /// Audit error
    #[error("Audit error: {0}")]
    Audit(#[from] warden_audit::AuditError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] warden_storage::StorageError),
}

/// Result type for role engine operations
pub type Result<T> = std::result::Result<T, RoleError>;
