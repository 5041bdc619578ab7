//! Policy type definitions.

use crate::errors::PolicyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Closed set of roles, ordered by tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    SiteAdmin,
}

impl Role {
    /// All roles from lowest to highest tier
    pub const ALL: [Role; 3] = [Role::User, Role::Admin, Role::SiteAdmin];

    /// Numeric tier; higher outranks lower
    pub fn tier(self) -> u8 {
        match self {
            Role::User => 1,
            Role::Admin => 2,
            Role::SiteAdmin => 3,
        }
    }

    /// Admin or site_admin
    pub fn is_admin_tier(self) -> bool {
        self >= Role::Admin
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SiteAdmin => "site_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "site_admin" => Ok(Role::SiteAdmin),
            other => Err(PolicyError::UnknownRole(other.to_string())),
        }
    }
}

/// Business operations subject to authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Password change, MFA, session management
    ManageAccount,
    /// Read a user's profile
    ViewUser,
    CreateUser,
    IssueTemporaryCredential,
    InitiatePromotion,
    /// Initiate a promotion whose target role is site_admin
    GrantSiteAdmin,
    VotePromotion,
    ViewPromotions,
    Demote,
    RequestDeletion,
    CancelDeletion,
    ViewDeletionStatus,
    OverrideDeletion,
    ViewAuditLog,
    ExportAuditLog,
    VerifyAuditLog,
}

impl Action {
    /// Actions that may never target the actor's own account
    pub fn forbids_self(self) -> bool {
        matches!(
            self,
            Action::IssueTemporaryCredential
                | Action::InitiatePromotion
                | Action::GrantSiteAdmin
                | Action::VotePromotion
                | Action::Demote
        )
    }
}

/// What an action is applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resource {
    /// The actor's own account
    Own,
    /// Another account, with its current highest role
    User { id: Uuid, role: Role },
    /// The service as a whole
    System,
}

/// Authenticated principal performing an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    /// Highest active role
    pub role: Role,
}

/// Authorization verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Deny,
}

/// Result of [`crate::is_authorized`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthzDecision {
    pub verdict: Verdict,
    /// Human-readable reason, recorded in the audit log
    pub reason: String,
    /// The action needs more than user-tier capabilities
    pub admin_tier: bool,
    pub audit_tags: Vec<String>,
}

impl AuthzDecision {
    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allow
    }
}

/// Rate limit state after a permitted attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub window_seconds: u64,
    pub max_attempts: u32,
    pub remaining: u32,
    pub reset_at: u64,
}
