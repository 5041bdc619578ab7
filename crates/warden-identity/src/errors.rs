//! Identity error types.

use thiserror::Error;
use uuid::Uuid;

/// Identity errors
#[derive(Debug, Error)]
pub enum IdentityError {
    /// User not found
    #[error("User not found: {0}")]
    NotFound(Uuid),

    /// Username already registered
    #[error("Username already taken")]
    UsernameTaken,

    /// Email already registered
    #[error("Email already registered")]
    EmailTaken,

    /// Username fails validation
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// Email fails validation
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] warden_storage::StorageError),

    /// Cryptographic error
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] warden_crypto::CryptoError),
}

/// Result type for identity operations
pub type Result<T> = std::result::Result<T, IdentityError>;
