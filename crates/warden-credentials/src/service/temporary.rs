//! Temporary credentials: issuance and one-time retrieval.

use super::CredentialService;
use crate::{
    errors::*, generator::generate_temporary_password, policy::PasswordPolicy,
    tokens::TokenVault, types::*,
};
use tracing::{info, warn};
use uuid::Uuid;
use warden_audit::{authorize, events, AuditRecorder, NewEvent, Outcome, Severity};
use warden_crypto::{client_password_hash, open_with_token, seal_with_token};
use warden_identity::UserDirectory;
use warden_policy::{Action, Actor, Resource};
use warden_storage::Storage;

impl<S, U, A> CredentialService<S, U, A>
where
    S: Storage + 'static,
    U: UserDirectory + 'static,
    A: AuditRecorder + 'static,
{
    /// Issue a temporary credential for `user_id` on behalf of `actor`.
    ///
    /// The returned retrieval token is the only way to learn the password.
    pub async fn issue_temporary_credential(
        &self,
        actor: &Actor,
        user_id: Uuid,
        ip_address: Option<String>,
    ) -> Result<IssuedCredential> {
        let role = self.directory.highest_role(user_id).await?;
        let decision = authorize(
            self.audit.as_ref(),
            actor,
            Action::IssueTemporaryCredential,
            &Resource::User { id: user_id, role },
            ip_address.clone(),
        )
        .await?;
        if !decision.is_allowed() {
            return Err(CredentialError::Forbidden(decision.reason));
        }

        self.provision_temporary_credential(user_id, Some(actor.user_id), ip_address)
            .await
    }

    /// Issue a temporary credential without an authorization check.
    ///
    /// Used right after an authorized account creation and for the bootstrap
    /// administrator.
    pub async fn provision_temporary_credential(
        &self,
        user_id: Uuid,
        issued_by: Option<Uuid>,
        ip_address: Option<String>,
    ) -> Result<IssuedCredential> {
        let user = self.directory.get_user(user_id).await?;
        let role = self.directory.highest_role(user_id).await?;
        let policy = PasswordPolicy::for_role(role);

        let password = generate_temporary_password(&policy)?;
        let raw_token = TokenVault::<S>::generate_raw()?;
        let sealed = seal_with_token(&raw_token, password.as_bytes(), &user_id)
            .map_err(|e| CredentialError::TokenGeneration(e.to_string()))?;
        let client_hash = client_password_hash(&password, &user.client_salt);

        let now = self.clock.now();
        let password_expires_at = now + self.config.temporary_ttl_seconds;

        let guard = self.storage.lock(&Self::credential_row(user_id)).await;
        let current = self.password_record(user_id).await?;
        let history = self.load_history(user_id).await?;

        let token = TokenVault::<S>::new_record(
            &raw_token,
            user_id,
            TokenType::Retrieval,
            self.config.retrieval_ttl_seconds,
            Some(sealed),
            now,
        );

        let mut batch = self.storage.batch();
        // Older retrieval tokens would reveal a superseded password
        self.tokens
            .stage_invalidate_for_user(batch.as_mut(), user_id, TokenType::Retrieval)
            .await?;
        self.stage_password(
            batch.as_mut(),
            user_id,
            current,
            history,
            &client_hash,
            password_expires_at,
            true,
        )?;
        TokenVault::<S>::stage(batch.as_mut(), &token)?;
        batch.commit().await?;
        drop(guard);

        self.revoke_sessions(user_id, "temporary_credential_issued")
            .await?;

        info!(
            user_id = %user_id,
            issued_by = ?issued_by,
            role = %role,
            "Temporary credential issued"
        );
        self.record(
            NewEvent::new(events::TEMP_CREDENTIAL_ISSUED, Severity::Warning)
                .maybe_actor(issued_by)
                .target(user_id)
                .ip(ip_address)
                .details(serde_json::json!({
                    "role": role.as_str(),
                    "expires_at": password_expires_at,
                })),
        )
        .await?;

        Ok(IssuedCredential {
            user_id,
            retrieval_token: raw_token,
            expires_at: token.expires_at,
        })
    }

    /// Exchange a retrieval token for the temporary password. Works once.
    pub async fn retrieve_credential(
        &self,
        raw_token: &str,
        ip_address: Option<String>,
    ) -> Result<TemporaryCredential> {
        let token = match self.tokens.consume(raw_token, TokenType::Retrieval).await {
            Ok(token) => token,
            Err(CredentialError::InvalidToken) => {
                warn!("Temporary credential retrieval with an invalid token");
                self.record(
                    NewEvent::new(events::TEMP_CREDENTIAL_RETRIEVED, Severity::Warning)
                        .ip(ip_address)
                        .outcome(Outcome::Failure)
                        .details(serde_json::json!({ "reason": "invalid_token" })),
                )
                .await?;
                return Err(CredentialError::InvalidToken);
            }
            Err(e) => return Err(e),
        };

        let sealed = token.payload.as_ref().ok_or(CredentialError::InvalidToken)?;
        let plaintext = open_with_token(raw_token, sealed, &token.user_id)
            .map_err(|_| CredentialError::InvalidToken)?;
        let temporary_password =
            String::from_utf8(plaintext.to_vec()).map_err(|_| CredentialError::InvalidToken)?;

        let user = self.directory.get_user(token.user_id).await?;
        let expires_at = self
            .password_record(token.user_id)
            .await?
            .filter(|record| record.must_change)
            .map(|record| record.expires_at)
            .unwrap_or(token.expires_at);

        info!(user_id = %user.user_id, "Temporary credential retrieved");
        self.record(
            NewEvent::new(events::TEMP_CREDENTIAL_RETRIEVED, Severity::Info)
                .target(user.user_id)
                .ip(ip_address),
        )
        .await?;

        Ok(TemporaryCredential {
            username: user.username.clone(),
            temporary_password,
            expires_at,
        })
    }
}
