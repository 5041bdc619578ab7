//! Identity type definitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_policy::Role;

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    /// A deletion request is pending; login is refused
    PendingDeletion,
    Disabled,
}

/// User account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: Uuid,
    /// Normalized (lowercase) username
    pub username: String,
    /// Normalized (lowercase) email
    pub email: String,
    pub status: UserStatus,
    /// Stable salt clients mix into their password hash
    pub client_salt: String,
    pub mfa_enabled: bool,
    pub created_at: u64,
    pub created_by: Option<Uuid>,
    pub updated_at: u64,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// A role held by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub assignment_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub active: bool,
    pub granted_at: u64,
    pub granted_by: Option<Uuid>,
    pub revoked_at: Option<u64>,
}

/// Request to create a user
#[derive(Debug, Clone)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    /// Initial role; the user tier is always granted as well
    pub role: Role,
    /// None for bootstrap accounts
    pub created_by: Option<Uuid>,
}
