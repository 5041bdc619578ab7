//! Cryptographic error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Sealing failed: {0}")]
    EncryptionFailed(String),

    /// Wrong key, wrong associated data, or a tampered ciphertext
    #[error("Opening sealed data failed: {0}")]
    DecryptionFailed(String),

    /// The OS entropy source refused to produce bytes
    #[error("Entropy source unavailable: {0}")]
    RandomGenerationFailed(String),

    #[error("Slow hash failed: {0}")]
    Argon2Failed(String),

    /// Stored hash or salt is not the expected encoding or length
    #[error("Malformed hash or salt")]
    InvalidHashFormat,

    #[error("Key derivation failed")]
    HkdfError,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
