use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_crypto::{SealedSecret, DAY, MINUTE};
use warden_policy::{Actor, Role};
use zeroize::Zeroizing;

/// Server-side session. Deleting it ends every token bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub created_at: u64,
    /// When the refresh token stops working
    pub expires_at: u64,
    pub last_refreshed_at: u64,
    /// Bumped on every refresh; older access tokens stop verifying
    pub access_generation: u32,
    pub access_expires_at: u64,
    /// Digest of the one live refresh token
    pub refresh_token_hash: [u8; 32],
    pub mfa_verified: bool,
    pub ip_address: Option<String>,
}

/// Refresh token record stored in database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub token_hash: [u8; 32],
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub generation: u32,
    pub created_at: u64,
    pub expires_at: u64,
    /// Set when the token was rotated away
    pub used_at: Option<u64>,
}

/// Login waiting for its second factor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMfa {
    pub token_hash: [u8; 32],
    pub user_id: Uuid,
    pub created_at: u64,
    pub expires_at: u64,
    pub must_change: bool,
    pub ip_address: Option<String>,
}

/// TOTP enrolment of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfaSecret {
    pub user_id: Uuid,
    /// TOTP seed sealed under the per-user key
    pub sealed_secret: SealedSecret,
    /// Hex BLAKE3 digests of unused backup codes
    pub backup_code_hashes: Vec<String>,
    /// False until a first code has been verified
    pub enabled: bool,
    pub created_at: u64,
    pub enabled_at: Option<u64>,
    /// Last accepted TOTP time step, so a code works once
    pub last_totp_step: Option<u64>,
}

/// JWT token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    /// User id
    pub sub: String,
    /// Session id
    pub sid: String,
    /// Access generation of the session at issue time
    pub gen: u32,
    pub iat: u64,
    pub exp: u64,
    pub jti: String,
}

/// Session tokens returned to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
    /// Seconds until the access token expires
    pub expires_in: u64,
    pub token_type: String,
}

/// Completed login
#[derive(Debug, Clone)]
pub struct AuthenticatedLogin {
    pub tokens: SessionTokens,
    pub user_id: Uuid,
    pub role: Role,
    /// The password is temporary and must be changed next
    pub must_change: bool,
}

/// Result of a password login
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(AuthenticatedLogin),
    /// A second factor is required; present `mfa_token` to `verify_mfa`
    MfaRequired { mfa_token: String, expires_at: u64 },
}

/// Lifecycle state reported by verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    /// The access token expires soon; refresh now
    Expiring,
}

/// A verified access token
#[derive(Debug, Clone)]
pub struct VerifiedSession {
    pub session: Session,
    pub actor: Actor,
    pub state: SessionState,
    pub access_expires_at: u64,
}

/// Returned once by `setup_mfa`
#[derive(Debug, Clone, Serialize)]
pub struct MfaSetup {
    /// Base32 TOTP secret
    pub secret: String,
    pub otpauth_url: String,
    pub backup_codes: Vec<String>,
}

/// Session service settings
#[derive(Clone)]
pub struct SessionConfig {
    pub issuer: String,
    pub jwt_secret: Zeroizing<Vec<u8>>,
    /// Seals TOTP secrets at rest
    pub master_key: Zeroizing<[u8; 32]>,
    pub access_token_ttl: u64,
    pub refresh_token_ttl: u64,
    pub pending_mfa_ttl: u64,
    /// Access tokens this close to expiry verify as `Expiring`
    pub expiring_window: u64,
}

impl SessionConfig {
    pub fn new(jwt_secret: &[u8], master_key: &[u8; 32]) -> Self {
        Self {
            issuer: "warden".to_string(),
            jwt_secret: Zeroizing::new(jwt_secret.to_vec()),
            master_key: Zeroizing::new(*master_key),
            access_token_ttl: 15 * MINUTE,
            refresh_token_ttl: 7 * DAY,
            pending_mfa_ttl: 5 * MINUTE,
            expiring_window: 2 * MINUTE,
        }
    }
}
