//! Session service implementation.

use crate::{errors::*, registry::SessionRegistry, types::*};
use jsonwebtoken::{DecodingKey, EncodingKey};
use std::sync::Arc;
use uuid::Uuid;
use warden_audit::{AuditRecorder, NewEvent};
use warden_credentials::CredentialService;
use warden_crypto::Clock;
use warden_identity::UserDirectory;
use warden_policy::{EphemeralStore, RateLimiter};
use warden_storage::Storage;

mod enrolment;
mod lifecycle;
mod login;
mod tokens;

/// Session manager
pub struct SessionService<S: Storage, U: UserDirectory, A: AuditRecorder> {
    storage: Arc<S>,
    directory: Arc<U>,
    audit: Arc<A>,
    credentials: Arc<CredentialService<S, U, A>>,
    registry: Arc<SessionRegistry<S, A>>,
    limiter: Arc<RateLimiter<dyn EphemeralStore>>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl<S, U, A> SessionService<S, U, A>
where
    S: Storage + 'static,
    U: UserDirectory + 'static,
    A: AuditRecorder + 'static,
{
    /// `registry` must be the same instance the credential service revokes through
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<S>,
        directory: Arc<U>,
        audit: Arc<A>,
        credentials: Arc<CredentialService<S, U, A>>,
        registry: Arc<SessionRegistry<S, A>>,
        limiter: Arc<RateLimiter<dyn EphemeralStore>>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        let encoding_key = EncodingKey::from_secret(&config.jwt_secret);
        let decoding_key = DecodingKey::from_secret(&config.jwt_secret);
        Self {
            storage,
            directory,
            audit,
            credentials,
            registry,
            limiter,
            clock,
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry<S, A>> {
        &self.registry
    }

    async fn record(&self, event: NewEvent) -> Result<()> {
        self.audit.record(event).await?;
        Ok(())
    }
}

fn mfa_row(user_id: Uuid) -> String {
    format!("mfa:{}", user_id)
}
