//! Event type names shared by producers and detectors.

pub const LOGIN_SUCCESS: &str = "auth.login.success";
pub const LOGIN_FAILURE: &str = "auth.login.failure";
pub const MFA_FAILURE: &str = "auth.mfa.failure";
pub const MFA_ENABLED: &str = "auth.mfa.enabled";
pub const MFA_DISABLED: &str = "auth.mfa.disabled";
pub const LOGOUT: &str = "auth.logout";
pub const SESSION_REVOKED: &str = "auth.session.revoked";
pub const REFRESH_REUSE: &str = "auth.refresh.reuse";

pub const AUTHZ_DENIED: &str = "authz.denied";

pub const USER_CREATED: &str = "user.created";
pub const PASSWORD_CHANGED: &str = "credential.password.changed";
pub const PASSWORD_RESET: &str = "credential.password.reset";
pub const PASSWORD_RESET_REQUESTED: &str = "credential.reset.requested";
pub const TEMP_CREDENTIAL_ISSUED: &str = "credential.temporary.issued";
pub const TEMP_CREDENTIAL_RETRIEVED: &str = "credential.temporary.retrieved";

pub const PROMOTION_INITIATED: &str = "role.promotion.initiated";
pub const PROMOTION_VOTE: &str = "role.promotion.vote";
pub const PROMOTION_APPROVED: &str = "role.promotion.approved";
pub const PROMOTION_REJECTED: &str = "role.promotion.rejected";
pub const PROMOTION_EXPIRED: &str = "role.promotion.expired";
pub const ROLE_DEMOTED: &str = "role.demoted";

pub const DELETION_REQUESTED: &str = "deletion.requested";
pub const DELETION_CANCELLED: &str = "deletion.cancelled";
pub const DELETION_COMPLETED: &str = "deletion.completed";
pub const DELETION_REMINDER: &str = "deletion.reminder";

pub const AUDIT_EXPORT: &str = "audit.export";
pub const DATA_BULK_READ: &str = "data.bulk_read";
pub const AUDIT_INTEGRITY_FAILURE: &str = "audit.integrity.failure";
pub const SECURITY_ALERT: &str = "security.alert";

/// Prefix for configuration change events
pub const CONFIG_PREFIX: &str = "config.";
/// Effective non-secret settings at startup
pub const CONFIG_LOADED: &str = "config.loaded";

/// Events that change how the system or an account is secured
pub fn is_configuration_change(event_type: &str) -> bool {
    event_type.starts_with(CONFIG_PREFIX) || matches!(event_type, MFA_ENABLED | MFA_DISABLED)
}
