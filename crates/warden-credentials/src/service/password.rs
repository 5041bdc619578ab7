//! Password change, reset and removal.

use super::CredentialService;
use crate::{errors::*, policy::PasswordPolicy, types::*};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use warden_audit::{events, AuditRecorder, NewEvent, Outcome, Severity};
use warden_crypto::{verify_slow_hash, DAY};
use warden_identity::UserDirectory;
use warden_storage::{BatchExt, Storage, CF_PASSWORD_HISTORY, CF_PASSWORD_RECORDS};

impl<S, U, A> CredentialService<S, U, A>
where
    S: Storage + 'static,
    U: UserDirectory + 'static,
    A: AuditRecorder + 'static,
{
    /// Replace the password of an authenticated user.
    ///
    /// Ends every session of the user on success.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_client_hash: &str,
        new_password: &NewPassword,
        ip_address: Option<String>,
    ) -> Result<PasswordRecord> {
        let role = self.directory.highest_role(user_id).await?;
        let policy = PasswordPolicy::for_role(role);

        let guard = self.storage.lock(&Self::credential_row(user_id)).await;
        let current = self
            .password_record(user_id)
            .await?
            .ok_or(CredentialError::NotFound(user_id))?;

        let verified = verify_slow_hash(
            current_client_hash,
            &current.server_salt,
            &current.hash,
            &self.config.slow_hash,
        )?;
        if !verified {
            drop(guard);
            warn!(user_id = %user_id, "Password change with wrong current password");
            self.record(
                NewEvent::new(events::PASSWORD_CHANGED, Severity::Warning)
                    .actor(user_id)
                    .target(user_id)
                    .ip(ip_address)
                    .outcome(Outcome::Failure)
                    .details(serde_json::json!({ "reason": "bad_password" })),
            )
            .await?;
            return Err(CredentialError::InvalidCredentials);
        }

        Self::enforce_policy(&policy, &new_password.characteristics)?;
        let history = self.load_history(user_id).await?;
        self.check_reuse(
            &new_password.client_hash,
            Some(&current),
            &history,
            policy.history_depth,
        )?;

        let expires_at = self.clock.now() + policy.max_age_seconds;
        let mut batch = self.storage.batch();
        let record = self.stage_password(
            batch.as_mut(),
            user_id,
            Some(current),
            history,
            &new_password.client_hash,
            expires_at,
            false,
        )?;
        batch.commit().await?;
        drop(guard);

        self.revoke_sessions(user_id, "password_changed").await?;

        info!(user_id = %user_id, "Password changed");
        self.record(
            NewEvent::new(events::PASSWORD_CHANGED, Severity::Info)
                .actor(user_id)
                .target(user_id)
                .ip(ip_address)
                .details(serde_json::json!({ "expires_at": expires_at })),
        )
        .await?;

        Ok(record)
    }

    /// Start a reset for the account registered under `email`.
    ///
    /// Succeeds whether or not the email is registered.
    pub async fn request_password_reset(&self, email: &str, ip_address: Option<String>) -> Result<()> {
        let user = match self.directory.find_by_email(email).await? {
            Some(user) if user.is_active() => user,
            _ => {
                debug!("Password reset requested for an unknown or inactive email");
                self.record(
                    NewEvent::new(events::PASSWORD_RESET_REQUESTED, Severity::Info)
                        .ip(ip_address)
                        .outcome(Outcome::Failure)
                        .details(serde_json::json!({ "reason": "no_active_account" })),
                )
                .await?;
                return Ok(());
            }
        };

        self.tokens
            .invalidate_for_user(user.user_id, TokenType::Reset)
            .await?;
        let (raw_token, token) = self
            .tokens
            .issue(user.user_id, TokenType::Reset, self.config.reset_ttl_seconds)
            .await?;

        if let Err(e) = self
            .notifier
            .password_reset_requested(&user, &raw_token, token.expires_at)
            .await
        {
            error!(user_id = %user.user_id, error = %e, "Failed to deliver password reset token");
        }

        info!(user_id = %user.user_id, "Password reset token issued");
        self.record(
            NewEvent::new(events::PASSWORD_RESET_REQUESTED, Severity::Info)
                .target(user.user_id)
                .ip(ip_address)
                .details(serde_json::json!({ "expires_at": token.expires_at })),
        )
        .await?;

        Ok(())
    }

    /// Set a new password with a reset token. The token is spent on success only.
    pub async fn reset_password(
        &self,
        raw_token: &str,
        new_password: &NewPassword,
        ip_address: Option<String>,
    ) -> Result<Uuid> {
        let token = self.tokens.peek(raw_token, TokenType::Reset).await?;
        let user_id = token.user_id;

        let role = self.directory.highest_role(user_id).await?;
        let policy = PasswordPolicy::for_role(role);
        Self::enforce_policy(&policy, &new_password.characteristics)?;

        let guard = self.storage.lock(&Self::credential_row(user_id)).await;
        let current = self.password_record(user_id).await?;
        let history = self.load_history(user_id).await?;
        self.check_reuse(
            &new_password.client_hash,
            current.as_ref(),
            &history,
            policy.history_depth,
        )?;

        self.tokens.consume(raw_token, TokenType::Reset).await?;

        let expires_at = self.clock.now() + policy.max_age_seconds;
        let mut batch = self.storage.batch();
        self.stage_password(
            batch.as_mut(),
            user_id,
            current,
            history,
            &new_password.client_hash,
            expires_at,
            false,
        )?;
        batch.commit().await?;
        drop(guard);

        self.revoke_sessions(user_id, "password_reset").await?;

        info!(user_id = %user_id, "Password reset");
        self.record(
            NewEvent::new(events::PASSWORD_RESET, Severity::Warning)
                .actor(user_id)
                .target(user_id)
                .ip(ip_address),
        )
        .await?;

        Ok(user_id)
    }

    /// Remove the password record, history and tokens of a user. Idempotent.
    pub async fn purge_user(&self, user_id: Uuid) -> Result<()> {
        let guard = self.storage.lock(&Self::credential_row(user_id)).await;
        let mut batch = self.storage.batch();
        batch.delete(CF_PASSWORD_RECORDS, &user_id)?;
        batch.delete(CF_PASSWORD_HISTORY, &user_id)?;
        batch.commit().await?;
        drop(guard);

        let tokens = self.tokens.purge_user(user_id).await?;
        debug!(user_id = %user_id, tokens, "Credentials purged");
        Ok(())
    }

    /// Drop tokens that have been dead for more than a day
    pub async fn purge_stale_tokens(&self) -> Result<usize> {
        self.tokens.purge_stale(DAY).await
    }
}
