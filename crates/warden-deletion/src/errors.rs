//! Deletion error types.

use thiserror::Error;
use uuid::Uuid;

/// Deletion queue errors
#[derive(Debug, Error)]
pub enum DeletionError {
    /// Caller may not perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// No deletion request exists for the user
    #[error("No deletion request for user {0}")]
    NotFound(Uuid),

    /// Request is not in a state that allows the operation
    #[error("{0}")]
    Conflict(String),

    /// Cancellation token absent, expired, used or not for this request
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Notification delivery failed
    #[error("Notifier error: {0}")]
    Notifier(String),

    /// Identity error
    #[error("Identity error: {0}")]
    Identity(#[from] warden_identity::IdentityError),

    /// Credential error
    #[error("Credential error: {0}")]
    Credential(#[from] warden_credentials::CredentialError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] warden_sessions::SessionError),

    /// Role engine error
    #[error("Role error: {0}")]
    Role(#[from] warden_roles::RoleError),

    /// Audit error
    #[error("Audit error: {0}")]
    Audit(#[from] warden_audit::AuditError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] warden_storage::StorageError),
}

/// Result type for deletion operations
pub type Result<T> = std::result::Result<T, DeletionError>;
