//! User directory service implementation.

use crate::{assignments, errors::*, traits::UserDirectory, types::*};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use warden_crypto::{random_bytes, Clock};
use warden_policy::{Actor, Role};
use warden_storage::{
    BatchExt, Storage, CF_USERS, CF_USERS_BY_EMAIL, CF_USERS_BY_USERNAME,
};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 32;

/// User directory backed by [`Storage`]
pub struct UserDirectoryService<S: Storage> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Storage + 'static> UserDirectoryService<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    fn normalize(value: &str) -> String {
        value.trim().to_lowercase()
    }

    fn validate_username(username: &str) -> Result<()> {
        if username.len() < USERNAME_MIN || username.len() > USERNAME_MAX {
            return Err(IdentityError::InvalidUsername(format!(
                "must be {}-{} characters",
                USERNAME_MIN, USERNAME_MAX
            )));
        }
        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(IdentityError::InvalidUsername(
                "only letters, digits, '_', '-' and '.' are allowed".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_email(email: &str) -> Result<()> {
        let valid = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
            }
            None => false,
        };
        if valid && email.len() <= 254 {
            Ok(())
        } else {
            Err(IdentityError::InvalidEmail(email.to_string()))
        }
    }

    async fn lookup_index(&self, cf: &str, key: &str) -> Result<Option<User>> {
        let user_id: Option<Uuid> = self.storage.get(cf, &key.to_string()).await?;
        match user_id {
            Some(id) => Ok(self.storage.get(CF_USERS, &id).await?),
            None => Ok(None),
        }
    }

    async fn update_user<F>(&self, user_id: Uuid, apply: F) -> Result<User>
    where
        F: FnOnce(&mut User) + Send,
    {
        let _guard = self.storage.lock(&format!("user:{}", user_id)).await;
        let mut user = self.get_user(user_id).await?;
        apply(&mut user);
        user.updated_at = self.clock.now();
        self.storage.put(CF_USERS, &user_id, &user).await?;
        Ok(user)
    }
}

#[async_trait]
impl<S: Storage + 'static> UserDirectory for UserDirectoryService<S> {
    async fn create_user(&self, request: CreateUserRequest) -> Result<User> {
        let username = Self::normalize(&request.username);
        let email = Self::normalize(&request.email);
        Self::validate_username(&username)?;
        Self::validate_email(&email)?;

        // Index rows are claimed under their own locks, username first
        let _username_guard = self.storage.lock(&format!("username:{}", username)).await;
        let _email_guard = self.storage.lock(&format!("email:{}", email)).await;

        if self.storage.exists(CF_USERS_BY_USERNAME, &username).await? {
            return Err(IdentityError::UsernameTaken);
        }
        if self.storage.exists(CF_USERS_BY_EMAIL, &email).await? {
            return Err(IdentityError::EmailTaken);
        }

        let now = self.clock.now();
        let user = User {
            user_id: Uuid::new_v4(),
            username,
            email,
            status: UserStatus::Active,
            client_salt: hex::encode(random_bytes::<16>()?),
            mfa_enabled: false,
            created_at: now,
            created_by: request.created_by,
            updated_at: now,
        };

        let mut batch = self.storage.batch();
        batch.put(CF_USERS, &user.user_id, &user)?;
        batch.put(CF_USERS_BY_USERNAME, &user.username, &user.user_id)?;
        batch.put(CF_USERS_BY_EMAIL, &user.email, &user.user_id)?;

        let mut granted = Vec::new();
        for role in [Role::User, request.role] {
            if granted.iter().any(|a: &RoleAssignment| a.role == role) {
                continue;
            }
            let assignment = assignments::stage_grant(
                batch.as_mut(),
                &granted,
                user.user_id,
                role,
                request.created_by,
                now,
            )?;
            granted.push(assignment);
        }
        batch.commit().await?;

        info!(
            user_id = %user.user_id,
            role = %request.role,
            "User created"
        );
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> Result<User> {
        self.storage
            .get(CF_USERS, &user_id)
            .await?
            .ok_or(IdentityError::NotFound(user_id))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.lookup_index(CF_USERS_BY_USERNAME, &Self::normalize(username))
            .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.lookup_index(CF_USERS_BY_EMAIL, &Self::normalize(email))
            .await
    }

    async fn set_status(&self, user_id: Uuid, status: UserStatus) -> Result<User> {
        let user = self.update_user(user_id, |u| u.status = status).await?;
        info!(user_id = %user_id, status = ?status, "User status changed");
        Ok(user)
    }

    async fn set_mfa_enabled(&self, user_id: Uuid, enabled: bool) -> Result<User> {
        self.update_user(user_id, |u| u.mfa_enabled = enabled).await
    }

    async fn role_assignments(&self, user_id: Uuid) -> Result<Vec<RoleAssignment>> {
        assignments::load(self.storage.as_ref(), user_id).await
    }

    async fn highest_role(&self, user_id: Uuid) -> Result<Role> {
        let rows = self.role_assignments(user_id).await?;
        Ok(assignments::highest_role(&rows))
    }

    async fn actor(&self, user_id: Uuid) -> Result<Actor> {
        // Fails for purged users
        self.get_user(user_id).await?;
        Ok(Actor {
            user_id,
            role: self.highest_role(user_id).await?,
        })
    }

    async fn purge_user(&self, user_id: Uuid) -> Result<()> {
        let _guard = self.storage.lock(&format!("user:{}", user_id)).await;
        let user: Option<User> = self.storage.get(CF_USERS, &user_id).await?;
        let rows = assignments::load(self.storage.as_ref(), user_id).await?;

        let mut batch = self.storage.batch();
        if let Some(user) = &user {
            batch.delete(CF_USERS_BY_USERNAME, &user.username)?;
            batch.delete(CF_USERS_BY_EMAIL, &user.email)?;
        }
        batch.delete(CF_USERS, &user_id)?;
        assignments::stage_purge(batch.as_mut(), &rows)?;
        batch.commit().await?;

        debug!(
            user_id = %user_id,
            existed = user.is_some(),
            assignments = rows.len(),
            "User purged"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_crypto::ManualClock;
    use warden_storage::RocksDbStorage;

    fn directory() -> UserDirectoryService<RocksDbStorage> {
        let storage = Arc::new(RocksDbStorage::open_test().unwrap());
        UserDirectoryService::new(storage, Arc::new(ManualClock::new(1_700_000_000)))
    }

    fn request(username: &str, role: Role) -> CreateUserRequest {
        CreateUserRequest {
            username: username.to_string(),
            email: format!("{}@example.com", username.to_lowercase()),
            role,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let dir = directory();
        let user = dir.create_user(request("Alice", Role::User)).await.unwrap();

        assert_eq!(user.username, "alice");
        assert!(user.is_active());
        assert_eq!(user.client_salt.len(), 32);

        let by_name = dir.find_by_username("ALICE").await.unwrap().unwrap();
        assert_eq!(by_name.user_id, user.user_id);
        let by_email = dir.find_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.user_id, user.user_id);
        assert!(dir.find_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicates_rejected() {
        let dir = directory();
        dir.create_user(request("alice", Role::User)).await.unwrap();

        assert!(matches!(
            dir.create_user(request("Alice", Role::User)).await,
            Err(IdentityError::UsernameTaken)
        ));

        let mut same_email = request("alice2", Role::User);
        same_email.email = "ALICE@example.com".to_string();
        assert!(matches!(
            dir.create_user(same_email).await,
            Err(IdentityError::EmailTaken)
        ));
    }

    #[tokio::test]
    async fn test_validation() {
        let dir = directory();
        assert!(matches!(
            dir.create_user(request("a", Role::User)).await,
            Err(IdentityError::InvalidUsername(_))
        ));
        let mut bad_email = request("carol", Role::User);
        bad_email.email = "carol".to_string();
        assert!(matches!(
            dir.create_user(bad_email).await,
            Err(IdentityError::InvalidEmail(_))
        ));
    }

    #[tokio::test]
    async fn test_initial_roles() {
        let dir = directory();
        let admin = dir.create_user(request("root", Role::SiteAdmin)).await.unwrap();
        let rows = dir.role_assignments(admin.user_id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(dir.highest_role(admin.user_id).await.unwrap(), Role::SiteAdmin);

        let actor = dir.actor(admin.user_id).await.unwrap();
        assert_eq!(actor.role, Role::SiteAdmin);
    }

    #[tokio::test]
    async fn test_status_and_mfa_updates() {
        let dir = directory();
        let user = dir.create_user(request("dave", Role::User)).await.unwrap();

        let updated = dir
            .set_status(user.user_id, UserStatus::PendingDeletion)
            .await
            .unwrap();
        assert_eq!(updated.status, UserStatus::PendingDeletion);

        let updated = dir.set_mfa_enabled(user.user_id, true).await.unwrap();
        assert!(updated.mfa_enabled);
        assert_eq!(updated.status, UserStatus::PendingDeletion);
    }

    #[tokio::test]
    async fn test_purge_is_idempotent() {
        let dir = directory();
        let user = dir.create_user(request("erin", Role::Admin)).await.unwrap();

        dir.purge_user(user.user_id).await.unwrap();
        dir.purge_user(user.user_id).await.unwrap();

        assert!(matches!(
            dir.get_user(user.user_id).await,
            Err(IdentityError::NotFound(_))
        ));
        assert!(dir.find_by_username("erin").await.unwrap().is_none());
        assert!(dir.role_assignments(user.user_id).await.unwrap().is_empty());

        // Username is free again
        dir.create_user(request("erin", Role::User)).await.unwrap();
    }
}
