use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use uuid::Uuid;
use warden_policy::Actor;
use warden_sessions::SessionState;

use crate::{error::ApiError, state::AppState};

/// Caller authenticated by a bearer access token.
///
/// The session record is read on every request, so a revoked session fails
/// here immediately.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub actor: Actor,
    pub session_id: Uuid,
    pub session_state: SessionState,
    pub mfa_verified: bool,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> Uuid {
        self.actor.user_id
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let verified = state
            .sessions
            .verify_access_token(token.trim())
            .await
            .map_err(|e| {
                tracing::debug!("Access token rejected: {}", e);
                ApiError::Unauthorized
            })?;

        Ok(AuthenticatedUser {
            actor: verified.actor,
            session_id: verified.session.session_id,
            session_state: verified.state,
            mfa_verified: verified.session.mfa_verified,
        })
    }
}

/// JSON body whose rejections use the API error envelope
pub struct Payload<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Payload(value)),
            Err(rejection) => Err(ApiError::InvalidRequest(rejection.body_text())),
        }
    }
}
