use axum::{
    http::{header::HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use warden_audit::AuditError;
use warden_credentials::{CredentialError, FieldError};
use warden_deletion::DeletionError;
use warden_identity::IdentityError;
use warden_policy::PolicyError;
use warden_roles::RoleError;
use warden_sessions::SessionError;
use warden_storage::StorageError;

/// Error envelope
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,
}

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited")]
    RateLimited { retry_after: u64, remaining: u32 },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Audit integrity failure: {0}")]
    Integrity(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let error = FieldError::new(field, message);
        ApiError::Validation {
            message: error.message.clone(),
            errors: vec![error],
        }
    }

    fn internal<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ApiError::Internal(anyhow::Error::new(error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut errors = None;
        let mut rate = None;
        let (status, message) = match self {
            ApiError::Validation {
                message,
                errors: fields,
            } => {
                errors = Some(fields);
                (StatusCode::BAD_REQUEST, message)
            }
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Missing or invalid credentials".to_string(),
            ),
            ApiError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "Invalid or expired token".to_string(),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::RateLimited {
                retry_after,
                remaining,
            } => {
                rate = Some((retry_after, remaining));
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    format!("Too many requests, retry after {} seconds", retry_after),
                )
            }
            ApiError::Unavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable".to_string(),
                )
            }
            ApiError::Integrity(msg) => {
                tracing::error!("Audit integrity failure: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Audit log integrity check failed".to_string(),
                )
            }
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            errors,
            retry_after: rate.map(|(retry_after, _)| retry_after),
            remaining_attempts: rate.map(|(_, remaining)| remaining),
        });

        let mut response = (status, body).into_response();
        if let Some((retry_after, remaining)) = rate {
            let headers = response.headers_mut();
            for (name, value) in [
                ("retry-after", retry_after.to_string()),
                ("x-ratelimit-remaining", remaining.to_string()),
                ("x-ratelimit-reset", retry_after.to_string()),
            ] {
                if let Ok(value) = HeaderValue::from_str(&value) {
                    headers.insert(HeaderName::from_static(name), value);
                }
            }
        }
        response
    }
}

impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::RateLimited {
                retry_after,
                remaining,
            } => ApiError::RateLimited {
                retry_after,
                remaining,
            },
            PolicyError::UnknownRole(role) => ApiError::field("role", format!("Unknown role: {}", role)),
            PolicyError::StoreFull(reason) => ApiError::Unavailable(reason.to_string()),
            other => ApiError::internal(other),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::internal(err)
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::NotFound(_) => ApiError::NotFound("User not found".to_string()),
            IdentityError::UsernameTaken => ApiError::Conflict("Username already taken".to_string()),
            IdentityError::EmailTaken => ApiError::Conflict("Email already registered".to_string()),
            IdentityError::InvalidUsername(msg) => ApiError::field("username", msg),
            IdentityError::InvalidEmail(msg) => ApiError::field("email", msg),
            other => ApiError::internal(other),
        }
    }
}

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::Integrity { sequence, reason } => {
                ApiError::Integrity(format!("sequence {}: {}", sequence, reason))
            }
            AuditError::NotFound(sequence) => {
                ApiError::NotFound(format!("Audit event {} not found", sequence))
            }
            AuditError::DeadlineExceeded(after) => {
                ApiError::Unavailable(format!("audit query exceeded {:?}", after))
            }
            other => ApiError::internal(other),
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::TokenGeneration(msg) => ApiError::Unavailable(msg),
            CredentialError::InvalidToken => ApiError::InvalidToken,
            CredentialError::InvalidCredentials => ApiError::Unauthorized,
            CredentialError::AccountUnavailable => {
                ApiError::Forbidden("Account is not available".to_string())
            }
            CredentialError::WeakPassword(errors) => ApiError::Validation {
                message: "Password does not meet policy".to_string(),
                errors,
            },
            CredentialError::PasswordReused => {
                ApiError::field("new_client_hash", "Password was used recently")
            }
            CredentialError::Forbidden(reason) => ApiError::Forbidden(reason),
            CredentialError::NotFound(_) => ApiError::NotFound("No credential on file".to_string()),
            CredentialError::Identity(e) => e.into(),
            CredentialError::Audit(e) => e.into(),
            other => ApiError::internal(other),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::SessionExpired
            | SessionError::InvalidToken
            | SessionError::RefreshTokenReuse { .. }
            | SessionError::InvalidMfaCode
            | SessionError::Jwt(_) => ApiError::Unauthorized,
            SessionError::SessionNotFound(_) => ApiError::NotFound("Session not found".to_string()),
            SessionError::MfaNotEnabled => ApiError::InvalidRequest("MFA is not enabled".to_string()),
            SessionError::MfaAlreadyEnabled => {
                ApiError::Conflict("MFA is already enabled".to_string())
            }
            SessionError::MfaSetupMissing => {
                ApiError::InvalidRequest("Start MFA setup before enabling it".to_string())
            }
            SessionError::TokenGeneration(msg) => ApiError::Unavailable(msg),
            SessionError::Credential(e) => e.into(),
            SessionError::Policy(e) => e.into(),
            SessionError::Identity(e) => e.into(),
            SessionError::Audit(e) => e.into(),
            other => ApiError::internal(other),
        }
    }
}

impl From<RoleError> for ApiError {
    fn from(err: RoleError) -> Self {
        match err {
            RoleError::Forbidden(reason) => ApiError::Forbidden(reason),
            RoleError::Conflict(msg) => ApiError::Conflict(msg),
            RoleError::InvalidOperation(msg) => ApiError::InvalidRequest(msg),
            RoleError::NotFound(_) => ApiError::NotFound("Promotion request not found".to_string()),
            RoleError::Identity(e) => e.into(),
            RoleError::Audit(e) => e.into(),
            RoleError::Storage(e) => e.into(),
        }
    }
}

impl From<DeletionError> for ApiError {
    fn from(err: DeletionError) -> Self {
        match err {
            DeletionError::Forbidden(reason) => ApiError::Forbidden(reason),
            DeletionError::NotFound(_) => ApiError::NotFound("No deletion request".to_string()),
            DeletionError::Conflict(msg) => ApiError::Conflict(msg),
            DeletionError::InvalidToken => ApiError::InvalidToken,
            DeletionError::Identity(e) => e.into(),
            DeletionError::Credential(e) => e.into(),
            DeletionError::Session(e) => e.into(),
            DeletionError::Role(e) => e.into(),
            DeletionError::Audit(e) => e.into(),
            other => ApiError::internal(other),
        }
    }
}
