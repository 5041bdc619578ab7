use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use warden_audit::{events, AuditRecorder, NewEvent, Severity};
use warden_credentials::{NewPassword, PasswordCharacteristics};
use warden_identity::{CreateUserRequest, UserDirectory};
use warden_policy::{csrf::CSRF_TOKEN_TTL_SECONDS, Action, RateRule, Resource, Role};
use warden_sessions::{AuthenticatedLogin, LoginOutcome, SessionTokens};

use super::helpers::{format_timestamp_rfc3339, hash_for_log, ok, require, ApiResult};
use crate::{
    extractors::{AuthenticatedUser, Payload},
    request_context::RequestContext,
    state::AppState,
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CsrfResponse {
    pub csrf_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub struct SaltResponse {
    pub username: String,
    pub client_salt: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub username: String,
    /// Single-use token for `POST /auth/password/retrieve`
    pub retrieval_token: String,
    pub retrieval_expires_at: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub client_hash: String,
    pub client_salt: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
    pub expires_in: u64,
    pub token_type: String,
}

impl From<SessionTokens> for TokenResponse {
    fn from(tokens: SessionTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            session_id: tokens.session_id,
            expires_in: tokens.expires_in,
            token_type: tokens.token_type,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginResponse {
    Authenticated {
        access_token: String,
        refresh_token: String,
        session_id: Uuid,
        expires_in: u64,
        token_type: String,
        user_id: Uuid,
        role: Role,
        must_change_password: bool,
    },
    MfaRequired {
        mfa_token: String,
        expires_at: String,
    },
}

impl From<AuthenticatedLogin> for LoginResponse {
    fn from(login: AuthenticatedLogin) -> Self {
        let tokens = login.tokens;
        LoginResponse::Authenticated {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            session_id: tokens.session_id,
            expires_in: tokens.expires_in,
            token_type: tokens.token_type,
            user_id: login.user_id,
            role: login.role,
            must_change_password: login.must_change,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_client_hash: String,
    pub new_client_hash: String,
    pub password_characteristics: PasswordCharacteristics,
}

#[derive(Debug, Serialize)]
pub struct PasswordChangedResponse {
    pub password_expires_at: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /auth/csrf
pub async fn issue_csrf_token(State(state): State<Arc<AppState>>) -> ApiResult<CsrfResponse> {
    let csrf_token = state.csrf.issue(state.now()).await?;
    ok(CsrfResponse {
        csrf_token,
        expires_in: CSRF_TOKEN_TTL_SECONDS,
    })
}

/// GET /auth/salt/:username
///
/// Answers for unknown usernames too, with a stable decoy salt.
pub async fn client_salt(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> ApiResult<SaltResponse> {
    let client_salt = state.credentials.client_salt_for(&username).await?;
    ok(SaltResponse {
        username,
        client_salt,
    })
}

/// POST /auth/register
///
/// An administrator creates a `user` account and receives the single-use
/// token that reveals its temporary password.
pub async fn register(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    auth: AuthenticatedUser,
    Payload(req): Payload<RegisterRequest>,
) -> ApiResult<RegisterResponse> {
    state
        .limiter
        .check(&RateRule::REGISTRATION, &ctx.ip_address, state.now())
        .await?;
    require(&state, &auth.actor, Action::CreateUser, Resource::System, ctx.ip()).await?;

    let user = state
        .directory
        .create_user(CreateUserRequest {
            username: req.username,
            email: req.email,
            role: Role::User,
            created_by: Some(auth.user_id()),
        })
        .await?;

    state
        .audit
        .record(
            NewEvent::new(events::USER_CREATED, Severity::Info)
                .actor(auth.user_id())
                .target(user.user_id)
                .ip(ctx.ip())
                .details(serde_json::json!({
                    "username": user.username,
                    "role": Role::User.as_str(),
                })),
        )
        .await?;

    let issued = state
        .credentials
        .provision_temporary_credential(user.user_id, Some(auth.user_id()), ctx.ip())
        .await?;

    tracing::info!(
        user_id = %user.user_id,
        created_by = %auth.user_id(),
        "Account registered"
    );

    ok(RegisterResponse {
        user_id: user.user_id,
        username: user.username,
        retrieval_token: issued.retrieval_token,
        retrieval_expires_at: format_timestamp_rfc3339(issued.expires_at),
    })
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Payload(req): Payload<LoginRequest>,
) -> ApiResult<LoginResponse> {
    state
        .limiter
        .check(&RateRule::LOGIN, &ctx.ip_address, state.now())
        .await?;

    let outcome = state
        .sessions
        .login(&req.username, &req.client_hash, &req.client_salt, ctx.ip())
        .await
        .map_err(|e| {
            tracing::info!(username = %hash_for_log(&req.username), ip = %ctx.ip_address, "Login refused: {}", e);
            e
        })?;

    match outcome {
        LoginOutcome::Authenticated(login) => ok(login.into()),
        LoginOutcome::MfaRequired {
            mfa_token,
            expires_at,
        } => ok(LoginResponse::MfaRequired {
            mfa_token,
            expires_at: format_timestamp_rfc3339(expires_at),
        }),
    }
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Payload(req): Payload<RefreshRequest>,
) -> ApiResult<TokenResponse> {
    let tokens = state.sessions.refresh(&req.refresh_token, ctx.ip()).await?;
    ok(tokens.into())
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> ApiResult<MessageResponse> {
    state.sessions.logout(auth.user_id(), auth.session_id).await?;
    ok(MessageResponse {
        message: "Signed out",
    })
}

/// POST /auth/change-password
///
/// Ends every session of the caller, this one included.
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    auth: AuthenticatedUser,
    Payload(req): Payload<ChangePasswordRequest>,
) -> ApiResult<PasswordChangedResponse> {
    let record = state
        .credentials
        .change_password(
            auth.user_id(),
            &req.current_client_hash,
            &NewPassword {
                client_hash: req.new_client_hash,
                characteristics: req.password_characteristics,
            },
            ctx.ip(),
        )
        .await?;

    ok(PasswordChangedResponse {
        password_expires_at: format_timestamp_rfc3339(record.expires_at),
    })
}
