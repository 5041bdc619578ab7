use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;

use crate::{error::ApiError, state::AppState};

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Liveness probe
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    status: &'static str,
    database: &'static str,
    audit_head: u64,
}

/// Readiness probe; reads the audit chain head to prove the store answers
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReadinessResponse>, ApiError> {
    let head = state
        .audit
        .head()
        .await
        .map_err(|e| ApiError::Unavailable(format!("database not ready: {}", e)))?;

    Ok(Json(ReadinessResponse {
        status: "ready",
        database: "connected",
        audit_head: head.sequence,
    }))
}
