//! Authorization checks that leave a trail.

use crate::{
    errors::Result,
    events,
    traits::AuditRecorder,
    types::{NewEvent, Outcome, Severity},
};
use tracing::warn;
use warden_policy::{is_authorized, Action, Actor, AuthzDecision, Resource};

/// Evaluate [`is_authorized`] and record an `authz.denied` event on denial.
///
/// Callers map a denied decision onto their own forbidden error.
pub async fn authorize<A: AuditRecorder + ?Sized>(
    audit: &A,
    actor: &Actor,
    action: Action,
    resource: &Resource,
    ip_address: Option<String>,
) -> Result<AuthzDecision> {
    let decision = is_authorized(actor, action, resource);
    if decision.is_allowed() {
        return Ok(decision);
    }

    warn!(
        actor_id = %actor.user_id,
        role = %actor.role,
        action = ?action,
        reason = %decision.reason,
        "Authorization denied"
    );

    let mut event = NewEvent::new(events::AUTHZ_DENIED, Severity::Warning)
        .actor(actor.user_id)
        .ip(ip_address)
        .outcome(Outcome::Denied)
        .details(serde_json::json!({
            "action": format!("{:?}", action),
            "reason": decision.reason,
            "admin_tier": decision.admin_tier,
            "tags": decision.audit_tags,
        }));
    if let Resource::User { id, .. } = resource {
        event = event.target(*id);
    }
    audit.record(event).await?;

    Ok(decision)
}
