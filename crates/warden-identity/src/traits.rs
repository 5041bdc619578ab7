//! Identity trait definitions.

use crate::{errors::Result, types::*};
use async_trait::async_trait;
use uuid::Uuid;
use warden_policy::{Actor, Role};

/// User directory
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Create an account with the user tier plus `request.role`
    async fn create_user(&self, request: CreateUserRequest) -> Result<User>;

    /// Get user by ID
    async fn get_user(&self, user_id: Uuid) -> Result<User>;

    /// Look up by username (case-insensitive)
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Look up by email (case-insensitive)
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Change account status
    async fn set_status(&self, user_id: Uuid, status: UserStatus) -> Result<User>;

    /// Record whether MFA is enabled
    async fn set_mfa_enabled(&self, user_id: Uuid, enabled: bool) -> Result<User>;

    /// All assignments, active or not
    async fn role_assignments(&self, user_id: Uuid) -> Result<Vec<RoleAssignment>>;

    /// Highest active role
    async fn highest_role(&self, user_id: Uuid) -> Result<Role>;

    /// Resolve a user into an authorization principal
    async fn actor(&self, user_id: Uuid) -> Result<Actor>;

    /// Remove the account, its indexes and role assignments. Idempotent.
    async fn purge_user(&self, user_id: Uuid) -> Result<()>;
}
