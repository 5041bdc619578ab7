use axum::extract::State;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warden_credentials::{NewPassword, PasswordCharacteristics};
use warden_policy::RateRule;

use super::helpers::{format_timestamp_rfc3339, hash_for_log, ok, ApiResult};
use crate::{extractors::Payload, request_context::RequestContext, state::AppState};

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct RetrieveResponse {
    pub username: String,
    pub temporary_password: String,
    pub expires_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequestBody {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ResetRequested {
    pub message: &'static str,
}

/// Identical for registered and unknown addresses
const RESET_REQUESTED: &str = "If the address is registered, a reset link has been sent";

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_client_hash: String,
    pub password_characteristics: PasswordCharacteristics,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordResponse {
    pub message: &'static str,
}

/// POST /auth/password/retrieve
///
/// Reveals a temporary password once; the token is spent by this call.
pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Payload(req): Payload<RetrieveRequest>,
) -> ApiResult<RetrieveResponse> {
    let credential = state
        .credentials
        .retrieve_credential(&req.token, ctx.ip())
        .await?;

    ok(RetrieveResponse {
        username: credential.username.clone(),
        temporary_password: credential.temporary_password.clone(),
        expires_at: format_timestamp_rfc3339(credential.expires_at),
    })
}

/// POST /auth/password/reset-request
pub async fn request_reset(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Payload(req): Payload<ResetRequestBody>,
) -> ApiResult<ResetRequested> {
    let email = req.email.trim().to_lowercase();
    state
        .limiter
        .check(&RateRule::PASSWORD_RESET, &email, state.now())
        .await?;

    tracing::debug!(email = %hash_for_log(&email), "Password reset requested");
    state
        .credentials
        .request_password_reset(&email, ctx.ip())
        .await?;

    ok(ResetRequested {
        message: RESET_REQUESTED,
    })
}

/// POST /auth/password/reset
pub async fn reset(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Payload(req): Payload<ResetPasswordRequest>,
) -> ApiResult<ResetPasswordResponse> {
    state
        .credentials
        .reset_password(
            &req.token,
            &NewPassword {
                client_hash: req.new_client_hash,
                characteristics: req.password_characteristics,
            },
            ctx.ip(),
        )
        .await?;

    ok(ResetPasswordResponse {
        message: "Password updated; sign in again",
    })
}
