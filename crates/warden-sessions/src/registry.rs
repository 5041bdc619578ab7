//! Persistence and revocation of sessions.

use crate::{errors::*, types::*};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_audit::{events, AuditRecorder, NewEvent, Severity};
use warden_crypto::Clock;
use warden_credentials::SessionRevoker;
use warden_storage::{
    child_id_from_key, child_key, Batch, BatchExt, Storage, CF_REFRESH_TOKENS, CF_SESSIONS,
    CF_SESSIONS_BY_USER,
};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationKind {
    /// The user signed out of the session they hold
    Logout,
    /// Any other ending: another device, revoke-all, credential change,
    /// deletion or replay detection
    Revoked,
}

impl RevocationKind {
    fn event(self) -> (&'static str, Severity) {
        match self {
            RevocationKind::Logout => (events::LOGOUT, Severity::Info),
            RevocationKind::Revoked => (events::SESSION_REVOKED, Severity::Warning),
        }
    }
}

/// Session rows and their indexes.
///
/// Refresh records outlive a revoked session until they expire, so a
/// presented token can still be told apart from an unknown one.
pub struct SessionRegistry<S: Storage, A: AuditRecorder> {
    storage: Arc<S>,
    audit: Arc<A>,
    clock: Arc<dyn Clock>,
}

impl<S: Storage, A: AuditRecorder> SessionRegistry<S, A> {
    pub fn new(storage: Arc<S>, audit: Arc<A>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            audit,
            clock,
        }
    }

    pub async fn get(&self, session_id: Uuid) -> Result<Option<Session>> {
        Ok(self.storage.get(CF_SESSIONS, &session_id).await?)
    }

    pub async fn refresh_record(&self, token_hash: &[u8; 32]) -> Result<Option<RefreshTokenRecord>> {
        Ok(self.storage.get(CF_REFRESH_TOKENS, token_hash).await?)
    }

    /// Persist a new session with its first refresh token
    pub async fn insert(&self, session: &Session, refresh: &RefreshTokenRecord) -> Result<()> {
        let mut batch = self.storage.batch();
        batch.put(CF_SESSIONS, &session.session_id, session)?;
        batch.put(
            CF_SESSIONS_BY_USER,
            &child_key(&session.user_id, &session.session_id),
            &session.session_id,
        )?;
        batch.put(CF_REFRESH_TOKENS, &refresh.token_hash, refresh)?;
        batch.commit().await?;
        Ok(())
    }

    /// Swap the live refresh token, keeping the old one as used for replay detection
    pub async fn rotate(
        &self,
        session: &Session,
        retired: &RefreshTokenRecord,
        fresh: &RefreshTokenRecord,
    ) -> Result<()> {
        let mut batch = self.storage.batch();
        batch.put(CF_SESSIONS, &session.session_id, session)?;
        batch.put(CF_REFRESH_TOKENS, &retired.token_hash, retired)?;
        batch.put(CF_REFRESH_TOKENS, &fresh.token_hash, fresh)?;
        batch.commit().await?;
        Ok(())
    }

    /// Sessions of a user, newest first
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Session>> {
        let index: Vec<(Vec<u8>, Uuid)> = self
            .storage
            .get_by_prefix(CF_SESSIONS_BY_USER, user_id.as_bytes())
            .await?;

        let mut sessions = Vec::with_capacity(index.len());
        for (key, _) in index {
            let Some(session_id) = child_id_from_key(&key) else {
                continue;
            };
            if let Some(session) = self.get(session_id).await? {
                sessions.push(session);
            }
        }
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    fn stage_removal(batch: &mut dyn Batch, session: &Session) -> Result<()> {
        batch.delete(CF_SESSIONS, &session.session_id)?;
        batch.delete(
            CF_SESSIONS_BY_USER,
            &child_key(&session.user_id, &session.session_id),
        )?;
        Ok(())
    }

    /// Delete one session and record why
    pub async fn revoke(
        &self,
        session: &Session,
        kind: RevocationKind,
        reason: &str,
        initiated_by: Option<Uuid>,
    ) -> Result<()> {
        let _guard = self.storage.lock(&session_row(session.session_id)).await;
        let mut batch = self.storage.batch();
        Self::stage_removal(batch.as_mut(), session)?;
        batch.commit().await?;

        let (event_type, severity) = kind.event();
        match kind {
            RevocationKind::Logout => {
                info!(user_id = %session.user_id, session_id = %session.session_id, "Logged out")
            }
            RevocationKind::Revoked => warn!(
                user_id = %session.user_id,
                session_id = %session.session_id,
                reason,
                "Session revoked"
            ),
        }

        self.audit
            .record(
                NewEvent::new(event_type, severity)
                    .maybe_actor(initiated_by)
                    .target(session.user_id)
                    .details(serde_json::json!({
                        "session_id": session.session_id,
                        "reason": reason,
                    })),
            )
            .await?;
        Ok(())
    }

    /// Delete every session of `user_id` except `keep`
    pub async fn revoke_all(
        &self,
        user_id: Uuid,
        keep: Option<Uuid>,
        reason: &str,
        initiated_by: Option<Uuid>,
    ) -> Result<usize> {
        let sessions: Vec<Session> = self
            .list_for_user(user_id)
            .await?
            .into_iter()
            .filter(|s| Some(s.session_id) != keep)
            .collect();
        if sessions.is_empty() {
            return Ok(0);
        }

        // Hold every row so a concurrent refresh cannot write a session back
        let mut guards = Vec::with_capacity(sessions.len());
        for session in &sessions {
            guards.push(self.storage.lock(&session_row(session.session_id)).await);
        }
        let mut batch = self.storage.batch();
        for session in &sessions {
            Self::stage_removal(batch.as_mut(), session)?;
        }
        batch.commit().await?;
        drop(guards);

        warn!(user_id = %user_id, revoked = sessions.len(), reason, "Sessions revoked");
        self.audit
            .record(
                NewEvent::new(events::SESSION_REVOKED, Severity::Warning)
                    .maybe_actor(initiated_by)
                    .target(user_id)
                    .details(serde_json::json!({
                        "sessions": sessions.iter().map(|s| s.session_id).collect::<Vec<_>>(),
                        "kept": keep,
                        "reason": reason,
                    })),
            )
            .await?;
        Ok(sessions.len())
    }

    /// Remove every session and refresh record of a user without auditing.
    /// Used when the account itself is purged.
    pub async fn purge_user(&self, user_id: Uuid) -> Result<usize> {
        let sessions = self.list_for_user(user_id).await?;
        let mut batch = self.storage.batch();
        for session in &sessions {
            Self::stage_removal(batch.as_mut(), session)?;
        }
        for (_, record) in self
            .storage
            .scan_all::<RefreshTokenRecord>(CF_REFRESH_TOKENS)
            .await?
        {
            if record.user_id == user_id {
                batch.delete(CF_REFRESH_TOKENS, &record.token_hash)?;
            }
        }
        batch.commit().await?;
        Ok(sessions.len())
    }

    /// Remove sessions and refresh records past their expiry
    pub async fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut batch = self.storage.batch();
        let mut removed = 0;

        for (_, session) in self.storage.scan_all::<Session>(CF_SESSIONS).await? {
            if session.expires_at <= now {
                Self::stage_removal(batch.as_mut(), &session)?;
                removed += 1;
            }
        }
        for (_, record) in self
            .storage
            .scan_all::<RefreshTokenRecord>(CF_REFRESH_TOKENS)
            .await?
        {
            if record.expires_at <= now {
                batch.delete(CF_REFRESH_TOKENS, &record.token_hash)?;
            }
        }
        batch.commit().await?;

        debug!(removed, "Expired sessions purged");
        Ok(removed)
    }
}

pub(crate) fn session_row(session_id: Uuid) -> String {
    format!("session:{}", session_id)
}

#[async_trait]
impl<S, A> SessionRevoker for SessionRegistry<S, A>
where
    S: Storage + 'static,
    A: AuditRecorder + 'static,
{
    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        reason: &str,
    ) -> warden_credentials::Result<usize> {
        self.revoke_all(user_id, None, reason, None)
            .await
            .map_err(|e| warden_credentials::CredentialError::Collaborator(e.to_string()))
    }
}
