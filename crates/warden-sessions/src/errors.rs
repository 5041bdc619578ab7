use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SessionError {
    /// Session missing, revoked or past expiry
    #[error("Session expired")]
    SessionExpired,

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Refresh token reuse detected for session {session_id}")]
    RefreshTokenReuse { session_id: Uuid },

    #[error("Invalid MFA code")]
    InvalidMfaCode,

    #[error("MFA is not enabled")]
    MfaNotEnabled,

    #[error("MFA is already enabled")]
    MfaAlreadyEnabled,

    #[error("MFA setup has not been started")]
    MfaSetupMissing,

    #[error("TOTP error: {0}")]
    Totp(String),

    #[error("Token generation failed: {0}")]
    TokenGeneration(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Credential error: {0}")]
    Credential(#[from] warden_credentials::CredentialError),

    #[error("Policy error: {0}")]
    Policy(#[from] warden_policy::PolicyError),

    #[error("Identity error: {0}")]
    Identity(#[from] warden_identity::IdentityError),

    #[error("Audit error: {0}")]
    Audit(#[from] warden_audit::AuditError),

    #[error("Storage error: {0}")]
    Storage(#[from] warden_storage::StorageError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] warden_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
