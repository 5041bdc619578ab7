//! Password verification without plaintext.

use super::CredentialService;
use crate::{errors::*, types::*};
use tracing::{debug, warn};
use uuid::Uuid;
use warden_audit::{events, AuditRecorder, NewEvent, Outcome, Severity};
use warden_crypto::{constant_time_compare, hmac_sha256, slow_hash, verify_slow_hash};
use warden_identity::UserDirectory;
use warden_storage::Storage;

// Valid PHC salt used to burn one slow hash when there is nothing to compare against
const DECOY_SERVER_SALT: &str = "d2FyZGVuZGVjb3lzYWx0";

impl<S, U, A> CredentialService<S, U, A>
where
    S: Storage + 'static,
    U: UserDirectory + 'static,
    A: AuditRecorder + 'static,
{
    /// Client salt for `username`.
    ///
    /// Unknown usernames get a stable decoy so the answer never reveals
    /// whether an account exists.
    pub async fn client_salt_for(&self, username: &str) -> Result<String> {
        if let Some(user) = self.directory.find_by_username(username).await? {
            return Ok(user.client_salt);
        }

        let normalized = username.trim().to_lowercase();
        let mac = hmac_sha256(&self.config.decoy_key[..], normalized.as_bytes())?;
        Ok(hex::encode(&mac[..16]))
    }

    /// Verify `client_hash` for `username`.
    ///
    /// Every failure before the password verifies is `InvalidCredentials`.
    pub async fn authenticate(
        &self,
        username: &str,
        client_hash: &str,
        client_salt: &str,
        ip_address: Option<String>,
    ) -> Result<AuthOutcome> {
        let Some(user) = self.directory.find_by_username(username).await? else {
            self.burn_slow_hash(client_hash);
            return self
                .reject_login(None, username, "unknown_user", ip_address)
                .await;
        };

        let Some(record) = self.password_record(user.user_id).await? else {
            self.burn_slow_hash(client_hash);
            return self
                .reject_login(Some(user.user_id), username, "no_credential", ip_address)
                .await;
        };

        let salt_matches = constant_time_compare(user.client_salt.as_bytes(), client_salt.as_bytes());
        let hash_matches = verify_slow_hash(
            client_hash,
            &record.server_salt,
            &record.hash,
            &self.config.slow_hash,
        )?;
        if !(salt_matches && hash_matches) {
            return self
                .reject_login(Some(user.user_id), username, "bad_password", ip_address)
                .await;
        }

        if record.is_expired(self.clock.now()) {
            return self
                .reject_login(Some(user.user_id), username, "password_expired", ip_address)
                .await;
        }

        if !user.is_active() {
            warn!(user_id = %user.user_id, status = ?user.status, "Login refused for unavailable account");
            self.record(
                NewEvent::new(events::LOGIN_FAILURE, Severity::Warning)
                    .actor(user.user_id)
                    .ip(ip_address)
                    .outcome(Outcome::Denied)
                    .details(serde_json::json!({
                        "username": user.username,
                        "reason": "account_unavailable",
                    })),
            )
            .await?;
            return Err(CredentialError::AccountUnavailable);
        }

        let role = self.directory.highest_role(user.user_id).await?;
        debug!(user_id = %user.user_id, must_change = record.must_change, "Password verified");

        Ok(AuthOutcome {
            user,
            role,
            must_change: record.must_change,
            password_expires_at: record.expires_at,
        })
    }

    fn burn_slow_hash(&self, client_hash: &str) {
        let _ = slow_hash(client_hash, DECOY_SERVER_SALT, &self.config.slow_hash);
    }

    async fn reject_login<T>(
        &self,
        user_id: Option<Uuid>,
        username: &str,
        reason: &str,
        ip_address: Option<String>,
    ) -> Result<T> {
        debug!(user_id = ?user_id, reason, "Login rejected");
        self.record(
            NewEvent::new(events::LOGIN_FAILURE, Severity::Warning)
                .maybe_actor(user_id)
                .ip(ip_address)
                .outcome(Outcome::Failure)
                .details(serde_json::json!({
                    "username": username.trim().to_lowercase(),
                    "reason": reason,
                })),
        )
        .await?;
        Err(CredentialError::InvalidCredentials)
    }
}
