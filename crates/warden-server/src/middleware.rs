use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use warden_policy::RateRule;

use crate::error::ApiError;
use crate::request_context::{direct_ip, extract_client_ip};
use crate::state::AppState;

pub const CSRF_HEADER: &str = "X-CSRF-Token";

fn client_ip(state: &AppState, req: &Request<Body>) -> String {
    extract_client_ip(
        req.headers(),
        direct_ip(req.extensions()),
        &state.config.trusted_proxies,
    )
}

/// Tag each request with an `X-Request-ID` and log start and completion
pub async fn request_id_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let request_id = req
        .headers()
        .get("X-Request-ID")
        .and_then(|h| h.to_str().ok())
        .filter(|id| !id.is_empty() && id.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let header_value = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = &header_value {
        req.headers_mut().insert("X-Request-ID", value.clone());
    }

    tracing::info!(
        request_id = %request_id,
        method = %req.method(),
        uri = %req.uri().path(),
        ip = %client_ip(&state, &req),
        "Request started"
    );

    let start = Instant::now();
    let mut response = next.run(req).await;

    if let Some(value) = header_value {
        response.headers_mut().insert("X-Request-ID", value);
    }

    tracing::info!(
        request_id = %request_id,
        status = %response.status(),
        elapsed_ms = start.elapsed().as_millis(),
        "Request completed"
    );

    response
}

/// Per-IP ceiling on all traffic
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip_address = client_ip(&state, &req);

    match state
        .limiter
        .check(&RateRule::GLOBAL, &ip_address, state.now())
        .await
    {
        Ok(limit) => {
            tracing::trace!(ip = %ip_address, remaining = limit.remaining, "Rate limit check passed");

            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            for (name, value) in [
                ("X-RateLimit-Limit", limit.max_attempts.to_string()),
                ("X-RateLimit-Remaining", limit.remaining.to_string()),
                ("X-RateLimit-Reset", limit.reset_at.to_string()),
            ] {
                if let Ok(value) = HeaderValue::from_str(&value) {
                    headers.entry(name).or_insert(value);
                }
            }
            response
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Require a live CSRF token on state-changing requests
pub async fn csrf_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let state_changing = matches!(
        *req.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );
    if !state_changing {
        return next.run(req).await;
    }

    let token = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    let valid = state.csrf.validate(token, state.now()).await;
    match valid {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            tracing::warn!(uri = %req.uri().path(), "CSRF token missing or invalid");
            ApiError::Forbidden("Missing or invalid CSRF token".to_string()).into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}
