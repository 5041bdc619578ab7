//! Session lifecycle operations: open, list, end, purge.

use crate::{errors::*, types::*, RevocationKind};
use tracing::{debug, info};
use uuid::Uuid;
use warden_audit::AuditRecorder;
use warden_identity::UserDirectory;
use warden_storage::{BatchExt, Storage, CF_MFA_SECRETS, CF_PENDING_MFA};

use super::SessionService;

impl<S, U, A> SessionService<S, U, A>
where
    S: Storage + 'static,
    U: UserDirectory + 'static,
    A: AuditRecorder + 'static,
{
    /// Persist a new session and issue its first token pair
    pub(super) async fn open_session(
        &self,
        user_id: Uuid,
        mfa_verified: bool,
        ip_address: Option<String>,
    ) -> Result<SessionTokens> {
        let now = self.clock.now();
        let session_id = Uuid::new_v4();
        let (refresh_token, refresh) = self.new_refresh_record(session_id, user_id, 0, now)?;

        let session = Session {
            session_id,
            user_id,
            created_at: now,
            expires_at: refresh.expires_at,
            last_refreshed_at: now,
            access_generation: 0,
            access_expires_at: now + self.config.access_token_ttl,
            refresh_token_hash: refresh.token_hash,
            mfa_verified,
            ip_address,
        };
        self.registry.insert(&session, &refresh).await?;

        info!(user_id = %user_id, session_id = %session_id, mfa_verified, "Session opened");
        Ok(SessionTokens {
            access_token: self.sign_access_token(&session, now)?,
            refresh_token,
            session_id,
            expires_in: self.config.access_token_ttl,
            token_type: "Bearer".to_string(),
        })
    }

    /// A session owned by `user_id`. Someone else's session is reported as
    /// missing.
    async fn owned_session(&self, user_id: Uuid, session_id: Uuid) -> Result<Session> {
        match self.registry.get(session_id).await? {
            Some(session) if session.user_id == user_id => Ok(session),
            _ => Err(SessionError::SessionNotFound(session_id)),
        }
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<Session> {
        self.registry
            .get(session_id)
            .await?
            .ok_or(SessionError::SessionNotFound(session_id))
    }

    /// Active sessions of a user, newest first
    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<Session>> {
        let now = self.clock.now();
        Ok(self
            .registry
            .list_for_user(user_id)
            .await?
            .into_iter()
            .filter(|s| s.expires_at > now)
            .collect())
    }

    /// End the session the caller is signed in with
    pub async fn logout(&self, user_id: Uuid, session_id: Uuid) -> Result<()> {
        let session = self.owned_session(user_id, session_id).await?;
        self.registry
            .revoke(&session, RevocationKind::Logout, "logout", Some(user_id))
            .await
    }

    /// End one of the caller's other sessions
    pub async fn revoke_session(&self, user_id: Uuid, session_id: Uuid) -> Result<()> {
        let session = self.owned_session(user_id, session_id).await?;
        self.registry
            .revoke(&session, RevocationKind::Revoked, "user_revoked", Some(user_id))
            .await
    }

    /// End every session of the caller except `current`
    pub async fn revoke_all_except(&self, user_id: Uuid, current: Uuid) -> Result<usize> {
        self.registry
            .revoke_all(user_id, Some(current), "revoke_others", Some(user_id))
            .await
    }

    /// End every session of `user_id`
    pub async fn revoke_all(
        &self,
        user_id: Uuid,
        reason: &str,
        initiated_by: Option<Uuid>,
    ) -> Result<usize> {
        self.registry
            .revoke_all(user_id, None, reason, initiated_by)
            .await
    }

    /// Drop sessions, pending logins and MFA enrolment of a purged account.
    /// Safe to repeat.
    pub async fn purge_user(&self, user_id: Uuid) -> Result<()> {
        let guard = self.storage.lock(&super::mfa_row(user_id)).await;
        let sessions = self.registry.purge_user(user_id).await?;

        let mut batch = self.storage.batch();
        batch.delete(CF_MFA_SECRETS, &user_id)?;
        for (_, pending) in self.storage.scan_all::<PendingMfa>(CF_PENDING_MFA).await? {
            if pending.user_id == user_id {
                batch.delete(CF_PENDING_MFA, &pending.token_hash)?;
            }
        }
        batch.commit().await?;
        drop(guard);

        debug!(user_id = %user_id, sessions, "Session data purged");
        Ok(())
    }

    /// Sweep expired sessions, refresh records and pending logins
    pub async fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut removed = self.registry.purge_expired().await?;

        let mut batch = self.storage.batch();
        for (_, pending) in self.storage.scan_all::<PendingMfa>(CF_PENDING_MFA).await? {
            if pending.expires_at <= now {
                batch.delete(CF_PENDING_MFA, &pending.token_hash)?;
                removed += 1;
            }
        }
        batch.commit().await?;
        Ok(removed)
    }
}
