//! TOTP enrolment: setup, enable, disable.

use crate::{errors::*, mfa, types::*};
use tracing::{info, warn};
use uuid::Uuid;
use warden_audit::{events, AuditRecorder, NewEvent, Severity};
use warden_crypto::seal_mfa_secret;
use warden_identity::UserDirectory;
use warden_storage::{Storage, CF_MFA_SECRETS};

use super::{mfa_row, SessionService};

impl<S, U, A> SessionService<S, U, A>
where
    S: Storage + 'static,
    U: UserDirectory + 'static,
    A: AuditRecorder + 'static,
{
    async fn mfa_secret(&self, user_id: Uuid) -> Result<Option<MfaSecret>> {
        Ok(self.storage.get(CF_MFA_SECRETS, &user_id).await?)
    }

    /// Start (or restart) enrolment. The secret and backup codes are only
    /// ever returned here.
    pub async fn setup_mfa(&self, user_id: Uuid) -> Result<MfaSetup> {
        let user = self.directory.get_user(user_id).await?;
        let _guard = self.storage.lock(&mfa_row(user_id)).await;

        if self.mfa_secret(user_id).await?.is_some_and(|s| s.enabled) {
            return Err(SessionError::MfaAlreadyEnabled);
        }

        let seed = mfa::generate_secret()?;
        let backup_codes = mfa::generate_backup_codes()?;
        let record = MfaSecret {
            user_id,
            sealed_secret: seal_mfa_secret(&self.config.master_key, &seed, &user_id)?,
            backup_code_hashes: backup_codes.iter().map(|c| mfa::hash_backup_code(c)).collect(),
            enabled: false,
            created_at: self.clock.now(),
            enabled_at: None,
            last_totp_step: None,
        };
        self.storage.put(CF_MFA_SECRETS, &user_id, &record).await?;

        let secret = mfa::encode_secret(&seed);
        Ok(MfaSetup {
            otpauth_url: mfa::otpauth_url(&self.config.issuer, &user.username, &secret),
            secret,
            backup_codes,
        })
    }

    /// Confirm enrolment with a first TOTP code
    pub async fn enable_mfa(&self, user_id: Uuid, code: &str, ip_address: Option<String>) -> Result<()> {
        let guard = self.storage.lock(&mfa_row(user_id)).await;
        let mut secret = self
            .mfa_secret(user_id)
            .await?
            .ok_or(SessionError::MfaSetupMissing)?;
        if secret.enabled {
            return Err(SessionError::MfaAlreadyEnabled);
        }

        let now = self.clock.now();
        if self.accept_code(&mut secret, code, now, false)?.is_none() {
            return Err(SessionError::InvalidMfaCode);
        }
        secret.enabled = true;
        secret.enabled_at = Some(now);
        self.storage.put(CF_MFA_SECRETS, &user_id, &secret).await?;
        self.directory.set_mfa_enabled(user_id, true).await?;
        drop(guard);

        info!(user_id = %user_id, "MFA enabled");
        self.record(
            NewEvent::new(events::MFA_ENABLED, Severity::Info)
                .actor(user_id)
                .ip(ip_address),
        )
        .await
    }

    /// Remove the second factor. Needs a current TOTP or backup code.
    pub async fn disable_mfa(&self, user_id: Uuid, code: &str, ip_address: Option<String>) -> Result<()> {
        let guard = self.storage.lock(&mfa_row(user_id)).await;
        let mut secret = self
            .mfa_secret(user_id)
            .await?
            .filter(|s| s.enabled)
            .ok_or(SessionError::MfaNotEnabled)?;

        if self
            .accept_code(&mut secret, code, self.clock.now(), true)?
            .is_none()
        {
            return Err(SessionError::InvalidMfaCode);
        }
        self.storage.delete(CF_MFA_SECRETS, &user_id).await?;
        self.directory.set_mfa_enabled(user_id, false).await?;
        drop(guard);

        warn!(user_id = %user_id, "MFA disabled");
        self.record(
            NewEvent::new(events::MFA_DISABLED, Severity::Warning)
                .actor(user_id)
                .ip(ip_address),
        )
        .await
    }
}
