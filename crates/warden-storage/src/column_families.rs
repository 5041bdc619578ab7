//! RocksDB column family definitions.
//!
//! One column family per logical table.

/// User records: user_id → User
pub const CF_USERS: &str = "users";

/// Username index: lowercase username → user_id
pub const CF_USERS_BY_USERNAME: &str = "users_by_username";

/// Email index: lowercase email → user_id
pub const CF_USERS_BY_EMAIL: &str = "users_by_email";

/// Role assignments: (user_id, assignment_id) → RoleAssignment
pub const CF_USER_ROLES: &str = "user_roles";

/// Active password record: user_id → PasswordRecord
pub const CF_PASSWORD_RECORDS: &str = "password_records";

/// Password history: user_id → Vec<PasswordHistoryEntry>
pub const CF_PASSWORD_HISTORY: &str = "password_history";

/// Single-use tokens: token_hash → TokenRecord
pub const CF_PASSWORD_TOKENS: &str = "password_tokens";

/// MFA secrets: user_id → MfaSecret
pub const CF_MFA_SECRETS: &str = "mfa_secrets";

/// Pending MFA logins: token_hash → PendingMfa (TTL: 5 min)
pub const CF_PENDING_MFA: &str = "pending_mfa";

/// Sessions: session_id → Session
pub const CF_SESSIONS: &str = "sessions";

/// Sessions by user index: (user_id, session_id) → ()
pub const CF_SESSIONS_BY_USER: &str = "sessions_by_user";

/// Refresh tokens: token_hash → RefreshTokenRecord
pub const CF_REFRESH_TOKENS: &str = "refresh_tokens";

/// Promotion requests: request_id → PromotionRequest
pub const CF_ROLE_PROMOTION_APPROVALS: &str = "role_promotion_approvals";

/// Votes: (request_id, voter_id) → ApprovalVote
pub const CF_APPROVAL_VOTES: &str = "approval_votes";

/// Deletion requests: request_id → DeletionRequest
pub const CF_USER_DELETION_QUEUE: &str = "user_deletion_queue";

/// Latest deletion request per user: user_id → request_id
pub const CF_DELETION_BY_USER: &str = "deletion_by_user";

/// Audit events: sequence (big-endian) → AuditEvent
pub const CF_AUDIT_LOG: &str = "audit_log";

/// Audit chain head: "head" → ChainHead
pub const CF_AUDIT_HEAD: &str = "audit_head";

/// Critical audit events index: sequence → ()
pub const CF_AUDIT_CRITICAL_EVENTS: &str = "audit_critical_events";

/// Security alerts: fingerprint → SecurityAlert
pub const CF_SECURITY_ALERTS: &str = "security_alerts";

/// Get all column family names
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        CF_USERS,
        CF_USERS_BY_USERNAME,
        CF_USERS_BY_EMAIL,
        CF_USER_ROLES,
        CF_PASSWORD_RECORDS,
        CF_PASSWORD_HISTORY,
        CF_PASSWORD_TOKENS,
        CF_MFA_SECRETS,
        CF_PENDING_MFA,
        CF_SESSIONS,
        CF_SESSIONS_BY_USER,
        CF_REFRESH_TOKENS,
        CF_ROLE_PROMOTION_APPROVALS,
        CF_APPROVAL_VOTES,
        CF_USER_DELETION_QUEUE,
        CF_DELETION_BY_USER,
        CF_AUDIT_LOG,
        CF_AUDIT_HEAD,
        CF_AUDIT_CRITICAL_EVENTS,
        CF_SECURITY_ALERTS,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_column_families_listed() {
        assert_eq!(all_column_families().len(), 20);
    }

    #[test]
    fn test_no_duplicate_column_families() {
        let cfs = all_column_families();
        let mut unique = std::collections::HashSet::new();

        for cf in &cfs {
            assert!(unique.insert(cf), "Duplicate column family: {}", cf);
        }
    }
}
