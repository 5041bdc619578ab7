use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;
use warden_audit::{
    events, AuditEventView, AuditFilter, AuditRecorder, Divergence, ExportFormat, NewEvent,
    SecurityAlert, SecuritySummary, Severity,
};
use warden_policy::{Action, Resource};

use super::helpers::{ok, require, ApiResult};
use crate::{
    error::ApiError, extractors::AuthenticatedUser, request_context::RequestContext,
    state::AppState,
};

/// Upper bound on one summary computation
const SUMMARY_DEADLINE: Duration = Duration::from_secs(5);

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    /// Unix seconds or RFC3339
    pub from: Option<String>,
    pub to: Option<String>,
    pub severity: Option<String>,
    pub actor_id: Option<String>,
    pub event_type: Option<String>,
    pub q: Option<String>,
    pub limit: Option<String>,
    /// Export only
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub from: Option<u64>,
    pub to: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub intact: bool,
    pub from_sequence: u64,
    pub to_sequence: u64,
    pub checked: u64,
    pub divergences: Vec<Divergence>,
}

fn parse_time(field: &'static str, value: &str) -> Result<u64, ApiError> {
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(secs);
    }
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .and_then(|dt| u64::try_from(dt.timestamp()).ok())
        .ok_or_else(|| ApiError::field(field, "Expected unix seconds or an RFC3339 timestamp"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl AuditQuery {
    pub fn to_filter(&self) -> Result<AuditFilter, ApiError> {
        let from = non_empty(self.from.clone())
            .map(|v| parse_time("from", &v))
            .transpose()?;
        let to = non_empty(self.to.clone())
            .map(|v| parse_time("to", &v))
            .transpose()?;
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(ApiError::field("from", "Must not be after 'to'"));
            }
        }

        let min_severity = match non_empty(self.severity.clone()) {
            None => None,
            Some(s) => Some(
                Severity::parse(&s)
                    .ok_or_else(|| ApiError::field("severity", format!("Unknown severity: {}", s)))?,
            ),
        };
        let actor_id = non_empty(self.actor_id.clone())
            .map(|id| Uuid::parse_str(&id))
            .transpose()
            .map_err(|_| ApiError::field("actor_id", "Must be a UUID"))?;
        let limit = non_empty(self.limit.clone())
            .map(|l| l.parse::<usize>())
            .transpose()
            .map_err(|_| ApiError::field("limit", "Must be a positive integer"))?;

        Ok(AuditFilter {
            from,
            to,
            min_severity,
            actor_id,
            event_type: non_empty(self.event_type.clone()),
            text: non_empty(self.q.clone()),
            limit,
        })
    }

    fn export_format(&self) -> Result<ExportFormat, ApiError> {
        match non_empty(self.format.clone()) {
            None => Ok(ExportFormat::Json),
            Some(f) => ExportFormat::parse(&f)
                .ok_or_else(|| ApiError::field("format", "Expected json, csv or xml")),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /audit-logs
pub async fn query_logs(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    auth: AuthenticatedUser,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Vec<AuditEventView>> {
    require(&state, &auth.actor, Action::ViewAuditLog, Resource::System, ctx.ip()).await?;
    let filter = query.to_filter()?;
    let found = state.audit.query(&filter).await?;

    state
        .audit
        .record(
            NewEvent::new(events::DATA_BULK_READ, Severity::Info)
                .actor(auth.user_id())
                .ip(ctx.ip())
                .details(serde_json::json!({
                    "resource": "audit_log",
                    "count": found.len(),
                })),
        )
        .await?;

    ok(found.iter().map(|e| e.view()).collect())
}

/// GET /audit/export
pub async fn export_logs(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    auth: AuthenticatedUser,
    Query(query): Query<AuditQuery>,
) -> Result<Response, ApiError> {
    require(&state, &auth.actor, Action::ExportAuditLog, Resource::System, ctx.ip()).await?;
    let filter = query.to_filter()?;
    let format = query.export_format()?;
    let body = state.audit.export(&filter, format).await?;

    state
        .audit
        .record(
            NewEvent::new(events::AUDIT_EXPORT, Severity::Warning)
                .actor(auth.user_id())
                .ip(ctx.ip())
                .details(serde_json::json!({
                    "format": format.extension(),
                    "bytes": body.len(),
                })),
        )
        .await?;

    let disposition = format!("attachment; filename=\"audit-export.{}\"", format.extension());
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// GET /audit/verify
pub async fn verify_logs(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    auth: AuthenticatedUser,
    Query(query): Query<VerifyQuery>,
) -> ApiResult<VerifyResponse> {
    require(&state, &auth.actor, Action::VerifyAuditLog, Resource::System, ctx.ip()).await?;
    let report = state.audit.verify_integrity(query.from, query.to).await?;
    if !report.is_intact() {
        tracing::error!(
            divergences = report.divergences.len(),
            first = report.divergences[0].sequence,
            "Audit chain verification found divergences"
        );
    }

    ok(VerifyResponse {
        intact: report.is_intact(),
        from_sequence: report.from_sequence,
        to_sequence: report.to_sequence,
        checked: report.checked,
        divergences: report.divergences,
    })
}

/// GET /audit/alerts
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    auth: AuthenticatedUser,
    Query(query): Query<AlertsQuery>,
) -> ApiResult<Vec<SecurityAlert>> {
    require(&state, &auth.actor, Action::ViewAuditLog, Resource::System, ctx.ip()).await?;
    let alerts = state.audit.list_alerts(query.limit).await?;
    ok(alerts)
}

/// GET /audit/summary
pub async fn security_summary(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    auth: AuthenticatedUser,
) -> ApiResult<SecuritySummary> {
    require(&state, &auth.actor, Action::ViewAuditLog, Resource::System, ctx.ip()).await?;
    let summary = state.audit.security_summary(SUMMARY_DEADLINE).await?;
    ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_seconds_and_rfc3339() {
        let query = AuditQuery {
            from: Some("60".to_string()),
            to: Some("1970-01-01T00:02:00Z".to_string()),
            severity: Some("warn".to_string()),
            q: Some("login".to_string()),
            ..Default::default()
        };
        let filter = query.to_filter().unwrap();
        assert_eq!(filter.from, Some(60));
        assert_eq!(filter.to, Some(120));
        assert_eq!(filter.min_severity, Some(Severity::Warning));
        assert_eq!(filter.text.as_deref(), Some("login"));
    }

    #[test]
    fn test_filter_rejects_bad_fields() {
        let inverted = AuditQuery {
            from: Some("200".to_string()),
            to: Some("100".to_string()),
            ..Default::default()
        };
        assert!(matches!(inverted.to_filter(), Err(ApiError::Validation { .. })));

        let bad_actor = AuditQuery {
            actor_id: Some("not-a-uuid".to_string()),
            ..Default::default()
        };
        assert!(matches!(bad_actor.to_filter(), Err(ApiError::Validation { .. })));
    }

    #[test]
    fn test_export_format_defaults_to_json() {
        assert_eq!(AuditQuery::default().export_format().unwrap(), ExportFormat::Json);
        let xml = AuditQuery {
            format: Some("XML".to_string()),
            ..Default::default()
        };
        assert_eq!(xml.export_format().unwrap(), ExportFormat::Xml);
    }
}
