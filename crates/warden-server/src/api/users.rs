use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use warden_deletion::{DeletionRequest, DeletionStatus};

use super::helpers::{format_timestamp_rfc3339, ok, ApiResult};
use crate::{
    error::ApiError,
    extractors::{AuthenticatedUser, Payload},
    request_context::RequestContext,
    state::AppState,
};

/// Literal the caller must echo back to delete an account
pub const DELETE_CONFIRMATION: &str = "DELETE";

#[derive(Debug, Deserialize)]
pub struct DeleteUserRequest {
    pub confirmation: String,
    #[serde(default)]
    pub override_cooling_off: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelDeletionRequest {
    /// Cancellation token from the deletion notice. Administrators may omit it.
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeletionView {
    pub request_id: Uuid,
    pub user_id: Uuid,
    pub status: DeletionStatus,
    pub requested_at: String,
    pub scheduled_for: String,
    pub override_applied: bool,
    pub reason: Option<String>,
    pub cancelled_at: Option<String>,
    pub completed_at: Option<String>,
}

impl From<&DeletionRequest> for DeletionView {
    fn from(request: &DeletionRequest) -> Self {
        Self {
            request_id: request.request_id,
            user_id: request.user_id,
            status: request.status,
            requested_at: format_timestamp_rfc3339(request.requested_at),
            scheduled_for: format_timestamp_rfc3339(request.scheduled_for),
            override_applied: request.override_applied,
            reason: request.reason.clone(),
            cancelled_at: request.cancelled_at.map(format_timestamp_rfc3339),
            completed_at: request.completed_at.map(format_timestamp_rfc3339),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeletionReceiptView {
    #[serde(flatten)]
    pub request: DeletionView,
    /// True when an earlier pending request was returned
    pub existing: bool,
    /// Present only when the account holder made the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_token: Option<String>,
}

/// DELETE /users/:id
pub async fn request_deletion(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    auth: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
    Payload(req): Payload<DeleteUserRequest>,
) -> ApiResult<DeletionReceiptView> {
    if req.confirmation != DELETE_CONFIRMATION {
        return Err(ApiError::field(
            "confirmation",
            format!("Type {} to confirm account deletion", DELETE_CONFIRMATION),
        ));
    }

    let receipt = state
        .deletions
        .request_deletion(
            &auth.actor,
            user_id,
            req.reason,
            req.override_cooling_off,
            ctx.ip(),
        )
        .await?;

    let self_requested = auth.user_id() == user_id;
    ok(DeletionReceiptView {
        request: (&receipt.request).into(),
        existing: receipt.existing,
        cancellation_token: receipt.cancellation_token.filter(|_| self_requested),
    })
}

/// POST /users/:id/cancel-deletion
///
/// A pending account cannot sign in, so the token path is unauthenticated.
pub async fn cancel_deletion(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    auth: Option<AuthenticatedUser>,
    Path(user_id): Path<Uuid>,
    Payload(req): Payload<CancelDeletionRequest>,
) -> ApiResult<DeletionView> {
    let request = match (req.token.as_deref(), auth) {
        (Some(token), _) => {
            state
                .deletions
                .cancel_deletion(user_id, token, ctx.ip())
                .await?
        }
        (None, Some(auth)) => {
            state
                .deletions
                .cancel_deletion_for(&auth.actor, user_id, ctx.ip())
                .await?
        }
        (None, None) => return Err(ApiError::Unauthorized),
    };
    ok((&request).into())
}

/// GET /users/:id/deletion-status
pub async fn deletion_status(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    auth: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<DeletionView> {
    let request = state
        .deletions
        .deletion_status(&auth.actor, user_id, ctx.ip())
        .await?;
    ok((&request).into())
}
