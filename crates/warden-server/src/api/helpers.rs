//! Shared API helper functions.

use axum::Json;
use serde::Serialize;
use warden_audit::authorize;
use warden_crypto::blake3_hash;
use warden_policy::{Action, Actor, Resource};

use crate::{error::ApiError, state::AppState};

/// Success envelope
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope {
        success: true,
        data,
    }))
}

/// Fail with 403 unless `actor` may perform `action`; denials are audited
pub async fn require(
    state: &AppState,
    actor: &Actor,
    action: Action,
    resource: Resource,
    ip_address: Option<String>,
) -> Result<(), ApiError> {
    let decision = authorize(state.audit.as_ref(), actor, action, &resource, ip_address).await?;
    if decision.is_allowed() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(decision.reason))
    }
}

/// Format a unix timestamp (seconds) as RFC3339.
pub fn format_timestamp_rfc3339(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

/// Short stable digest for correlating identifiers in logs
pub fn hash_for_log(value: &str) -> String {
    let hash = blake3_hash(value.as_bytes());
    hex::encode(&hash[..8])
}
