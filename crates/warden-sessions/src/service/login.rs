//! Password login and second-factor completion.

use crate::{errors::*, mfa, types::*};
use tracing::{info, warn};
use warden_audit::{events, AuditRecorder, NewEvent, Outcome, Severity};
use warden_credentials::CredentialError;
use warden_crypto::{generate_token, open_mfa_secret, token_hash};
use warden_identity::{User, UserDirectory};
use warden_policy::{RateRule, Role};
use warden_storage::{BatchExt, Storage, CF_MFA_SECRETS, CF_PENDING_MFA};

use super::{mfa_row, SessionService};

impl<S, U, A> SessionService<S, U, A>
where
    S: Storage + 'static,
    U: UserDirectory + 'static,
    A: AuditRecorder + 'static,
{
    /// Verify the password and either open a session or hand back a
    /// short-lived token for the second factor
    pub async fn login(
        &self,
        username: &str,
        client_hash: &str,
        client_salt: &str,
        ip_address: Option<String>,
    ) -> Result<LoginOutcome> {
        let outcome = self
            .credentials
            .authenticate(username, client_hash, client_salt, ip_address.clone())
            .await?;

        if outcome.user.mfa_enabled {
            let now = self.clock.now();
            let mfa_token =
                generate_token().map_err(|e| SessionError::TokenGeneration(e.to_string()))?;
            let pending = PendingMfa {
                token_hash: token_hash(&mfa_token),
                user_id: outcome.user.user_id,
                created_at: now,
                expires_at: now + self.config.pending_mfa_ttl,
                must_change: outcome.must_change,
                ip_address,
            };
            self.storage
                .put(CF_PENDING_MFA, &pending.token_hash, &pending)
                .await?;

            info!(user_id = %outcome.user.user_id, "Password verified, awaiting second factor");
            return Ok(LoginOutcome::MfaRequired {
                mfa_token,
                expires_at: pending.expires_at,
            });
        }

        let login = self
            .complete_login(&outcome.user, outcome.role, outcome.must_change, None, ip_address)
            .await?;
        Ok(LoginOutcome::Authenticated(login))
    }

    /// Finish a login with a TOTP or backup code.
    ///
    /// Failures count against the user's MFA window; once it is exhausted
    /// every attempt is refused until the window closes.
    pub async fn verify_mfa(
        &self,
        mfa_token: &str,
        code: &str,
        ip_address: Option<String>,
    ) -> Result<AuthenticatedLogin> {
        let hash = token_hash(mfa_token);
        let now = self.clock.now();
        let pending: PendingMfa = match self.storage.get::<_, PendingMfa>(CF_PENDING_MFA, &hash).await? {
            Some(pending) if pending.expires_at > now => pending,
            _ => return Err(SessionError::InvalidToken),
        };

        let subject = pending.user_id.to_string();
        self.limiter
            .ensure_not_locked(&RateRule::MFA_VERIFY, &subject, now)
            .await?;

        let guard = self.storage.lock(&mfa_row(pending.user_id)).await;
        let mut secret: MfaSecret = self
            .storage
            .get(CF_MFA_SECRETS, &pending.user_id)
            .await?
            .filter(|s: &MfaSecret| s.enabled)
            .ok_or(SessionError::MfaNotEnabled)?;

        let Some(method) = self.accept_code(&mut secret, code, now, true)? else {
            drop(guard);
            warn!(user_id = %pending.user_id, "MFA verification failed");
            self.limiter
                .record_failure(&RateRule::MFA_VERIFY, &subject, now)
                .await?;
            self.record(
                NewEvent::new(events::MFA_FAILURE, Severity::Warning)
                    .actor(pending.user_id)
                    .ip(ip_address)
                    .outcome(Outcome::Failure),
            )
            .await?;
            return Err(SessionError::InvalidMfaCode);
        };

        // Code and pending login are spent together
        let mut batch = self.storage.batch();
        batch.put(CF_MFA_SECRETS, &pending.user_id, &secret)?;
        batch.delete(CF_PENDING_MFA, &hash)?;
        batch.commit().await?;
        drop(guard);
        self.limiter.reset(&RateRule::MFA_VERIFY, &subject).await?;

        let user = self.directory.get_user(pending.user_id).await?;
        if !user.is_active() {
            return Err(CredentialError::AccountUnavailable.into());
        }
        let role = self.directory.highest_role(user.user_id).await?;

        self.complete_login(&user, role, pending.must_change, Some(method), ip_address)
            .await
    }

    /// Check `code` against an enrolment; `None` means it did not match.
    ///
    /// A TOTP step is accepted once. A matching backup code is removed.
    pub(super) fn accept_code(
        &self,
        secret: &mut MfaSecret,
        code: &str,
        now: u64,
        allow_backup: bool,
    ) -> Result<Option<&'static str>> {
        let code = code.trim();
        let seed = open_mfa_secret(&self.config.master_key, &secret.sealed_secret, &secret.user_id)?;

        if let Some(step) = mfa::matching_step(&seed, code, now)? {
            if secret.last_totp_step.is_some_and(|last| step <= last) {
                return Ok(None);
            }
            secret.last_totp_step = Some(step);
            return Ok(Some("totp"));
        }

        if allow_backup {
            if let Some(index) = mfa::find_backup_code(code, &secret.backup_code_hashes) {
                secret.backup_code_hashes.remove(index);
                return Ok(Some("backup_code"));
            }
        }
        Ok(None)
    }

    async fn complete_login(
        &self,
        user: &User,
        role: Role,
        must_change: bool,
        mfa_method: Option<&'static str>,
        ip_address: Option<String>,
    ) -> Result<AuthenticatedLogin> {
        let tokens = self
            .open_session(user.user_id, mfa_method.is_some(), ip_address.clone())
            .await?;

        self.record(
            NewEvent::new(events::LOGIN_SUCCESS, Severity::Info)
                .actor(user.user_id)
                .ip(ip_address)
                .details(serde_json::json!({
                    "role": role.as_str(),
                    "mfa": mfa_method,
                    "session_id": tokens.session_id,
                })),
        )
        .await?;

        Ok(AuthenticatedLogin {
            tokens,
            user_id: user.user_id,
            role,
            must_change,
        })
    }
}
