//! Policy error types.

use thiserror::Error;

/// Policy errors
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Rate limit exceeded; the caller may retry after `retry_after` seconds
    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimited {
        /// Seconds until the current window closes
        retry_after: u64,
        /// Attempts left in the window (always 0 when limited)
        remaining: u32,
    },

    /// Unknown role name
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// The ephemeral store has no room for another value
    #[error("Ephemeral store is full: {0}")]
    StoreFull(&'static str),

    /// Ephemeral store failure
    #[error("Ephemeral store error: {0}")]
    Store(String),

    /// Crypto error
    #[error("Crypto error: {0}")]
    Crypto(#[from] warden_crypto::CryptoError),
}

/// Result type for policy operations
pub type Result<T> = std::result::Result<T, PolicyError>;
