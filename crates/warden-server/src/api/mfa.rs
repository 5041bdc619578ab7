use axum::extract::State;
use serde::Deserialize;
use std::sync::Arc;
use warden_sessions::MfaSetup;

use super::{
    auth::{LoginResponse, MessageResponse},
    helpers::{ok, ApiResult},
};
use crate::{
    extractors::{AuthenticatedUser, Payload},
    request_context::RequestContext,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct VerifyMfaRequest {
    pub mfa_token: String,
    /// TOTP code or backup code
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct MfaCodeRequest {
    pub code: String,
}

/// POST /auth/mfa/verify
pub async fn verify_mfa(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Payload(req): Payload<VerifyMfaRequest>,
) -> ApiResult<LoginResponse> {
    let login = state
        .sessions
        .verify_mfa(&req.mfa_token, &req.code, ctx.ip())
        .await?;
    ok(login.into())
}

/// POST /auth/mfa/setup
///
/// The secret and backup codes are shown once; MFA stays off until enabled.
pub async fn setup_mfa(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> ApiResult<MfaSetup> {
    let setup = state.sessions.setup_mfa(auth.user_id()).await?;
    ok(setup)
}

/// POST /auth/mfa/enable
pub async fn enable_mfa(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    auth: AuthenticatedUser,
    Payload(req): Payload<MfaCodeRequest>,
) -> ApiResult<MessageResponse> {
    state
        .sessions
        .enable_mfa(auth.user_id(), &req.code, ctx.ip())
        .await?;
    ok(MessageResponse {
        message: "MFA enabled",
    })
}

/// POST /auth/mfa/disable
pub async fn disable_mfa(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    auth: AuthenticatedUser,
    Payload(req): Payload<MfaCodeRequest>,
) -> ApiResult<MessageResponse> {
    state
        .sessions
        .disable_mfa(auth.user_id(), &req.code, ctx.ip())
        .await?;
    ok(MessageResponse {
        message: "MFA disabled",
    })
}
