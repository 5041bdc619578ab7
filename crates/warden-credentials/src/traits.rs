//! Collaborators the credential service calls out to.

use crate::errors::Result;
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;
use warden_identity::User;

/// Ends a user's sessions after a credential change
#[async_trait]
pub trait SessionRevoker: Send + Sync {
    /// Revoke every session of `user_id`, returning how many ended
    async fn revoke_all_for_user(&self, user_id: Uuid, reason: &str) -> Result<usize>;
}

/// Delivers password reset tokens to their owner
#[async_trait]
pub trait CredentialNotifier: Send + Sync {
    async fn password_reset_requested(&self, user: &User, raw_token: &str, expires_at: u64) -> Result<()>;
}

/// Notifier that only logs. The token itself is never written out.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl CredentialNotifier for LoggingNotifier {
    async fn password_reset_requested(&self, user: &User, _raw_token: &str, expires_at: u64) -> Result<()> {
        info!(
            user_id = %user.user_id,
            expires_at,
            "Password reset token ready for delivery"
        );
        Ok(())
    }
}
