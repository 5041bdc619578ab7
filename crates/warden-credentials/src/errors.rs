//! Credential error types.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// A field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Credential errors
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The entropy source failed while creating secrets
    #[error("Token generation failed: {0}")]
    TokenGeneration(String),

    /// Token absent, expired, already used or of the wrong kind
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Deliberately generic authentication failure
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Password verified but the account cannot sign in
    #[error("Account unavailable")]
    AccountUnavailable,

    /// New password does not meet the role policy
    #[error("Password does not meet policy")]
    WeakPassword(Vec<FieldError>),

    /// New password matches a recent one
    #[error("Password was used recently")]
    PasswordReused,

    /// Caller may not perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// No password record exists for the user
    #[error("No credential for user {0}")]
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

    /// Cryptographic error
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] warden_crypto::CryptoError),

    /// Collaborator failure (session revocation, notification)
    #[error("{0}")]
    Collaborator(String),
}

/// Result type for credential operations
pub type Result<T> = std::result::Result<T, CredentialError>;
