//! Credential type definitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_crypto::SealedSecret;
use warden_identity::User;
use warden_policy::Role;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The single live password of a user. Never holds plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordRecord {
    pub user_id: Uuid,
    /// PHC string of `slow_hash(client_hash, server_salt)`
    pub hash: String,
    pub server_salt: String,
    pub created_at: u64,
    pub expires_at: u64,
    /// Set for server-generated temporary passwords
    pub must_change: bool,
}

impl PasswordRecord {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// A retired password kept for reuse checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHistoryEntry {
    pub hash: String,
    pub server_salt: String,
    pub retired_at: u64,
}

/// What a token may be exchanged for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// One-time retrieval of a temporary password
    Retrieval,
    /// Password reset
    Reset,
    /// Cancellation of a pending deletion
    Cancellation,
}

impl TokenType {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenType::Retrieval => "retrieval",
            TokenType::Reset => "reset",
            TokenType::Cancellation => "cancellation",
        }
    }
}

/// Stored single-use token. Only the digest of the raw value is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token_hash: [u8; 32],
    pub user_id: Uuid,
    pub token_type: TokenType,
    pub created_at: u64,
    pub expires_at: u64,
    pub used_at: Option<u64>,
    /// Secret only the raw token can open
    pub payload: Option<SealedSecret>,
}

impl TokenRecord {
    pub fn is_live(&self, now: u64) -> bool {
        self.used_at.is_none() && now < self.expires_at
    }
}

/// Shape of a new password, reported by the client next to its hash
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordCharacteristics {
    pub length: usize,
    pub has_lowercase: bool,
    pub has_uppercase: bool,
    pub has_digit: bool,
    pub has_symbol: bool,
}

impl PasswordCharacteristics {
    /// Characteristics of a plaintext password (clients and generated passwords)
    pub fn of(password: &str) -> Self {
        Self {
            length: password.chars().count(),
            has_lowercase: password.chars().any(|c| c.is_ascii_lowercase()),
            has_uppercase: password.chars().any(|c| c.is_ascii_uppercase()),
            has_digit: password.chars().any(|c| c.is_ascii_digit()),
            has_symbol: password
                .chars()
                .any(|c| !c.is_alphanumeric() && !c.is_whitespace()),
        }
    }
}

/// Returned to the admin who issued a temporary credential
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub user_id: Uuid,
    /// Raw retrieval token, handed to the user out of band
    pub retrieval_token: String,
    pub expires_at: u64,
}

/// A temporary credential revealed by its retrieval token
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct TemporaryCredential {
    pub username: String,
    pub temporary_password: String,
    pub expires_at: u64,
}

/// Successful password verification
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub user: User,
    pub role: Role,
    /// The password is temporary and must be replaced
    pub must_change: bool,
    pub password_expires_at: u64,
}

/// A password change or reset submitted by a client
#[derive(Debug, Clone)]
pub struct NewPassword {
    /// `client_password_hash(password, client_salt)`
    pub client_hash: String,
    pub characteristics: PasswordCharacteristics,
}
