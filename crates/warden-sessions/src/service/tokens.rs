//! Access token signing and verification, refresh rotation.

use crate::{errors::*, registry::session_row, types::*, RevocationKind};
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use tracing::{debug, warn};
use uuid::Uuid;
use warden_audit::{events, AuditRecorder, NewEvent, Severity};
use warden_crypto::{generate_token, token_hash};
use warden_identity::UserDirectory;
use warden_storage::Storage;

use super::SessionService;

impl<S, U, A> SessionService<S, U, A>
where
    S: Storage + 'static,
    U: UserDirectory + 'static,
    A: AuditRecorder + 'static,
{
    pub(super) fn sign_access_token(&self, session: &Session, now: u64) -> Result<String> {
        let claims = TokenClaims {
            iss: self.config.issuer.clone(),
            sub: session.user_id.to_string(),
            sid: session.session_id.to_string(),
            gen: session.access_generation,
            iat: now,
            exp: session.access_expires_at,
            jti: Uuid::new_v4().to_string(),
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Signature, algorithm and issuer only. Expiry is checked against the
    /// service clock by the caller.
    fn decode_access_token(&self, token: &str) -> Result<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.validate_exp = false;
        validation.validate_aud = false;

        decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Access token rejected");
                SessionError::InvalidToken
            })
    }

    pub(super) fn new_refresh_record(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        generation: u32,
        now: u64,
    ) -> Result<(String, RefreshTokenRecord)> {
        let raw = generate_token().map_err(|e| SessionError::TokenGeneration(e.to_string()))?;
        let record = RefreshTokenRecord {
            token_hash: token_hash(&raw),
            session_id,
            user_id,
            generation,
            created_at: now,
            expires_at: now + self.config.refresh_token_ttl,
            used_at: None,
        };
        Ok((raw, record))
    }

    /// Verify an access token against its live session.
    ///
    /// Reads the session on every call, so a revoked session fails at once.
    pub async fn verify_access_token(&self, token: &str) -> Result<VerifiedSession> {
        let claims = self.decode_access_token(token)?;
        let session_id = Uuid::parse_str(&claims.sid).map_err(|_| SessionError::InvalidToken)?;
        let now = self.clock.now();

        let session = self
            .registry
            .get(session_id)
            .await?
            .ok_or(SessionError::SessionExpired)?;
        if session.user_id.to_string() != claims.sub {
            return Err(SessionError::InvalidToken);
        }
        if claims.gen != session.access_generation
            || claims.exp <= now
            || session.expires_at <= now
        {
            return Err(SessionError::SessionExpired);
        }

        let actor = self.directory.actor(session.user_id).await?;
        let state = if claims.exp - now <= self.config.expiring_window {
            SessionState::Expiring
        } else {
            SessionState::Active
        };

        Ok(VerifiedSession {
            session,
            actor,
            state,
            access_expires_at: claims.exp,
        })
    }

    /// Rotate both tokens of the session bound to `refresh_token`.
    ///
    /// A token that was already rotated away is replay: the session is revoked.
    pub async fn refresh(&self, refresh_token: &str, ip_address: Option<String>) -> Result<SessionTokens> {
        let hash = token_hash(refresh_token);
        let Some(record) = self.registry.refresh_record(&hash).await? else {
            return Err(SessionError::InvalidToken);
        };

        let guard = self.storage.lock(&session_row(record.session_id)).await;
        // Re-read under the lock; a concurrent refresh may have rotated it
        let record = self
            .registry
            .refresh_record(&hash)
            .await?
            .ok_or(SessionError::InvalidToken)?;
        let now = self.clock.now();

        if record.used_at.is_some() {
            drop(guard);
            return self.handle_refresh_reuse(&record, ip_address).await;
        }
        if record.expires_at <= now {
            return Err(SessionError::SessionExpired);
        }

        let mut session = match self.registry.get(record.session_id).await? {
            Some(session) if session.expires_at > now && session.refresh_token_hash == hash => session,
            _ => return Err(SessionError::SessionExpired),
        };
        if !self.directory.get_user(session.user_id).await?.is_active() {
            return Err(SessionError::SessionExpired);
        }

        let generation = record.generation + 1;
        let (raw, fresh) = self.new_refresh_record(session.session_id, session.user_id, generation, now)?;
        session.access_generation = generation;
        session.last_refreshed_at = now;
        session.expires_at = fresh.expires_at;
        session.access_expires_at = now + self.config.access_token_ttl;
        session.refresh_token_hash = fresh.token_hash;

        let retired = RefreshTokenRecord {
            used_at: Some(now),
            ..record
        };
        self.registry.rotate(&session, &retired, &fresh).await?;
        let access_token = self.sign_access_token(&session, now)?;
        drop(guard);

        debug!(session_id = %session.session_id, generation, "Session refreshed");
        Ok(SessionTokens {
            access_token,
            refresh_token: raw,
            session_id: session.session_id,
            expires_in: self.config.access_token_ttl,
            token_type: "Bearer".to_string(),
        })
    }

    async fn handle_refresh_reuse(
        &self,
        record: &RefreshTokenRecord,
        ip_address: Option<String>,
    ) -> Result<SessionTokens> {
        warn!(
            user_id = %record.user_id,
            session_id = %record.session_id,
            generation = record.generation,
            "Refresh token reuse detected"
        );

        if let Some(session) = self.registry.get(record.session_id).await? {
            self.registry
                .revoke(&session, RevocationKind::Revoked, "refresh_token_reuse", None)
                .await?;
        }

        self.record(
            NewEvent::new(events::REFRESH_REUSE, Severity::Warning)
                .target(record.user_id)
                .ip(ip_address)
                .details(serde_json::json!({
                    "session_id": record.session_id,
                    "generation": record.generation,
                })),
        )
        .await?;

        Err(SessionError::RefreshTokenReuse {
            session_id: record.session_id,
        })
    }
}
