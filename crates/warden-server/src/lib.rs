//! HTTP surface, background jobs and wiring for the warden services.

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

pub mod api;
pub mod config;
pub mod error;
pub mod extractors;
pub mod jobs;
pub mod middleware;
pub mod request_context;
pub mod state;

pub use config::Config;
pub use error::ApiError;
pub use state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health checks
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Authentication
        .route("/auth/csrf", get(api::auth::issue_csrf_token))
        .route("/auth/salt/:username", get(api::auth::client_salt))
        .route("/auth/register", post(api::auth::register))
        .route("/auth/login", post(api::auth::login))
        .route("/auth/refresh", post(api::auth::refresh))
        .route("/auth/logout", post(api::auth::logout))
        .route("/auth/change-password", post(api::auth::change_password))
        // MFA
        .route("/auth/mfa/verify", post(api::mfa::verify_mfa))
        .route("/auth/mfa/setup", post(api::mfa::setup_mfa))
        .route("/auth/mfa/enable", post(api::mfa::enable_mfa))
        .route("/auth/mfa/disable", post(api::mfa::disable_mfa))
        // Credentials
        .route("/auth/password/retrieve", post(api::password::retrieve))
        .route("/auth/password/reset-request", post(api::password::request_reset))
        .route("/auth/password/reset", post(api::password::reset))
        // Sessions
        .route("/auth/sessions", get(api::sessions::list_sessions))
        .route("/auth/sessions/revoke", post(api::sessions::revoke_session))
        .route(
            "/auth/sessions/revoke-others",
            post(api::sessions::revoke_other_sessions),
        )
        // Roles
        .route("/auth/roles/promote", post(api::roles::promote))
        .route(
            "/auth/roles/approve-promotion",
            post(api::roles::approve_promotion),
        )
        .route("/auth/roles/demote", post(api::roles::demote))
        .route("/auth/roles/promotions", get(api::roles::list_promotions))
        // Account deletion
        .route("/users/:id", axum::routing::delete(api::users::request_deletion))
        .route(
            "/users/:id/cancel-deletion",
            post(api::users::cancel_deletion),
        )
        .route(
            "/users/:id/deletion-status",
            get(api::users::deletion_status),
        )
        // Audit
        .route("/audit-logs", get(api::audit::query_logs))
        .route("/audit/export", get(api::audit::export_logs))
        .route("/audit/verify", get(api::audit::verify_logs))
        .route("/audit/alerts", get(api::audit::list_alerts))
        .route("/audit/summary", get(api::audit::security_summary))
        // Add middleware
        .layer(from_fn_with_state(state.clone(), middleware::csrf_middleware))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::request_id_middleware,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
