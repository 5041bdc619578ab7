use axum::extract::State;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use warden_sessions::{Session, SessionState};

use super::{
    auth::MessageResponse,
    helpers::{format_timestamp_rfc3339, ok, ApiResult},
};
use crate::{
    extractors::{AuthenticatedUser, Payload},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub created_at: String,
    pub expires_at: String,
    pub last_refreshed_at: String,
    pub ip_address: Option<String>,
    pub mfa_verified: bool,
    pub current: bool,
}

impl SessionView {
    fn new(session: Session, current: Uuid) -> Self {
        Self {
            session_id: session.session_id,
            created_at: format_timestamp_rfc3339(session.created_at),
            expires_at: format_timestamp_rfc3339(session.expires_at),
            last_refreshed_at: format_timestamp_rfc3339(session.last_refreshed_at),
            ip_address: session.ip_address,
            mfa_verified: session.mfa_verified,
            current: session.session_id == current,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionList {
    /// State of the session this request was made with
    pub current_state: SessionState,
    pub sessions: Vec<SessionView>,
}

#[derive(Debug, Deserialize)]
pub struct RevokeSessionRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RevokedCount {
    pub revoked: usize,
}

/// GET /auth/sessions
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> ApiResult<SessionList> {
    let sessions = state.sessions.list_sessions(auth.user_id()).await?;
    ok(SessionList {
        current_state: auth.session_state,
        sessions: sessions
            .into_iter()
            .map(|s| SessionView::new(s, auth.session_id))
            .collect(),
    })
}

/// POST /auth/sessions/revoke
pub async fn revoke_session(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Payload(req): Payload<RevokeSessionRequest>,
) -> ApiResult<MessageResponse> {
    state
        .sessions
        .revoke_session(auth.user_id(), req.session_id)
        .await?;
    ok(MessageResponse {
        message: "Session revoked",
    })
}

/// POST /auth/sessions/revoke-others
pub async fn revoke_other_sessions(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> ApiResult<RevokedCount> {
    let revoked = state
        .sessions
        .revoke_all_except(auth.user_id(), auth.session_id)
        .await?;
    ok(RevokedCount { revoked })
}
