//! Credential service implementation.

use crate::{errors::*, policy::PasswordPolicy, tokens::TokenVault, traits::*, types::*};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;
use warden_audit::{AuditRecorder, NewEvent};
use warden_crypto::{
    generate_server_salt, hkdf_derive_32, slow_hash, verify_slow_hash, Clock, SlowHashParams,
    DAY, DOMAIN_DECOY_SALT, HOUR,
};
use warden_identity::UserDirectory;
use warden_storage::{Batch, BatchExt, Storage, CF_PASSWORD_HISTORY, CF_PASSWORD_RECORDS};
use zeroize::Zeroizing;

mod authentication;
mod password;
mod temporary;

/// Retired passwords kept per user, enough for the deepest role policy
pub const HISTORY_RETENTION: usize = 10;

/// Credential service settings
#[derive(Clone)]
pub struct CredentialConfig {
    pub slow_hash: SlowHashParams,
    /// Lifetime of a temporary password
    pub temporary_ttl_seconds: u64,
    /// Lifetime of the token that reveals it
    pub retrieval_ttl_seconds: u64,
    pub reset_ttl_seconds: u64,
    /// Keys the decoy client salts handed out for unknown usernames
    pub decoy_key: Zeroizing<[u8; 32]>,
}

impl CredentialConfig {
    /// Default lifetimes with the decoy key derived from the service master key
    pub fn new(master_key: &[u8; 32]) -> Result<Self> {
        Ok(Self {
            slow_hash: SlowHashParams::default(),
            temporary_ttl_seconds: DAY,
            retrieval_ttl_seconds: DAY,
            reset_ttl_seconds: HOUR,
            decoy_key: hkdf_derive_32(master_key, DOMAIN_DECOY_SALT.as_bytes())?,
        })
    }

    pub fn with_slow_hash(mut self, params: SlowHashParams) -> Self {
        self.slow_hash = params;
        self
    }
}

/// Credential lifecycle manager
pub struct CredentialService<S: Storage, U: UserDirectory, A: AuditRecorder> {
    storage: Arc<S>,
    directory: Arc<U>,
    audit: Arc<A>,
    sessions: Arc<dyn SessionRevoker>,
    notifier: Arc<dyn CredentialNotifier>,
    tokens: TokenVault<S>,
    clock: Arc<dyn Clock>,
    config: CredentialConfig,
}

impl<S, U, A> CredentialService<S, U, A>
where
    S: Storage + 'static,
    U: UserDirectory + 'static,
    A: AuditRecorder + 'static,
{
    pub fn new(
        storage: Arc<S>,
        directory: Arc<U>,
        audit: Arc<A>,
        sessions: Arc<dyn SessionRevoker>,
        clock: Arc<dyn Clock>,
        config: CredentialConfig,
    ) -> Self {
        Self {
            tokens: TokenVault::new(Arc::clone(&storage), Arc::clone(&clock)),
            storage,
            directory,
            audit,
            sessions,
            notifier: Arc::new(LoggingNotifier),
            clock,
            config,
        }
    }

    /// Replace the default logging notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn CredentialNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Current password record, if any
    pub async fn password_record(&self, user_id: Uuid) -> Result<Option<PasswordRecord>> {
        Ok(self.storage.get(CF_PASSWORD_RECORDS, &user_id).await?)
    }

    async fn load_history(&self, user_id: Uuid) -> Result<Vec<PasswordHistoryEntry>> {
        Ok(self
            .storage
            .get(CF_PASSWORD_HISTORY, &user_id)
            .await?
            .unwrap_or_default())
    }

    fn enforce_policy(policy: &PasswordPolicy, chars: &PasswordCharacteristics) -> Result<()> {
        let violations = policy.violations(chars);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(CredentialError::WeakPassword(violations))
        }
    }

    /// Reject `client_hash` if it matches one of the last `depth` passwords.
    ///
    /// The live password counts as the most recent one.
    fn check_reuse(
        &self,
        client_hash: &str,
        current: Option<&PasswordRecord>,
        history: &[PasswordHistoryEntry],
        depth: usize,
    ) -> Result<()> {
        let params = &self.config.slow_hash;
        let mut remaining = depth;

        if let Some(record) = current {
            if verify_slow_hash(client_hash, &record.server_salt, &record.hash, params)? {
                return Err(CredentialError::PasswordReused);
            }
            remaining = remaining.saturating_sub(1);
        }

        for entry in history.iter().take(remaining) {
            if verify_slow_hash(client_hash, &entry.server_salt, &entry.hash, params)? {
                return Err(CredentialError::PasswordReused);
            }
        }
        Ok(())
    }

    /// Stage a new live password, retiring `current` into the history
    #[allow(clippy::too_many_arguments)]
    fn stage_password(
        &self,
        batch: &mut dyn Batch,
        user_id: Uuid,
        current: Option<PasswordRecord>,
        mut history: Vec<PasswordHistoryEntry>,
        client_hash: &str,
        expires_at: u64,
        must_change: bool,
    ) -> Result<PasswordRecord> {
        let now = self.clock.now();
        let server_salt = generate_server_salt();
        let hash = slow_hash(client_hash, &server_salt, &self.config.slow_hash)?;

        if let Some(retired) = current {
            history.insert(
                0,
                PasswordHistoryEntry {
                    hash: retired.hash,
                    server_salt: retired.server_salt,
                    retired_at: now,
                },
            );
            history.truncate(HISTORY_RETENTION);
        }

        let record = PasswordRecord {
            user_id,
            hash,
            server_salt,
            created_at: now,
            expires_at,
            must_change,
        };
        batch.put(CF_PASSWORD_RECORDS, &user_id, &record)?;
        batch.put(CF_PASSWORD_HISTORY, &user_id, &history)?;
        Ok(record)
    }

    async fn revoke_sessions(&self, user_id: Uuid, reason: &str) -> Result<()> {
        let revoked = self.sessions.revoke_all_for_user(user_id, reason).await?;
        if revoked > 0 {
            warn!(user_id = %user_id, revoked, reason, "Sessions revoked after credential change");
        }
        Ok(())
    }

    async fn record(&self, event: NewEvent) -> Result<()> {
        self.audit.record(event).await?;
        Ok(())
    }

    fn credential_row(user_id: Uuid) -> String {
        format!("credentials:{}", user_id)
    }
}
