//! Deletion queue service implementation.

use crate::{errors::*, traits::*, types::*};
use std::sync::Arc;
use uuid::Uuid;
use warden_audit::{authorize, AuditRecorder, NewEvent};
use warden_credentials::{CredentialService, TokenVault};
use warden_crypto::Clock;
use warden_identity::UserDirectory;
use warden_policy::{Action, Actor, Resource};
use warden_roles::RoleService;
use warden_sessions::SessionService;
use warden_storage::{Batch, BatchExt, Storage, CF_DELETION_BY_USER, CF_USER_DELETION_QUEUE};

mod request;
mod sweep;

/// Deletion queue settings
#[derive(Debug, Clone)]
pub struct DeletionConfig {
    pub cooling_off_seconds: u64,
    pub claim_timeout_seconds: u64,
    /// Identifies this process in sweep claims
    pub worker_id: String,
}

impl DeletionConfig {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            cooling_off_seconds: COOLING_OFF_SECONDS,
            claim_timeout_seconds: CLAIM_TIMEOUT_SECONDS,
            worker_id: worker_id.into(),
        }
    }
}

/// Deletion requests, cancellation and the purge sweep
pub struct DeletionService<S: Storage, U: UserDirectory, A: AuditRecorder> {
    storage: Arc<S>,
    directory: Arc<U>,
    audit: Arc<A>,
    credentials: Arc<CredentialService<S, U, A>>,
    sessions: Arc<SessionService<S, U, A>>,
    roles: Arc<RoleService<S, U, A>>,
    tokens: TokenVault<S>,
    notifier: Arc<dyn DeletionNotifier>,
    clock: Arc<dyn Clock>,
    config: DeletionConfig,
}

impl<S, U, A> DeletionService<S, U, A>
where
    S: Storage + 'static,
    U: UserDirectory + 'static,
    A: AuditRecorder + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<S>,
        directory: Arc<U>,
        audit: Arc<A>,
        credentials: Arc<CredentialService<S, U, A>>,
        sessions: Arc<SessionService<S, U, A>>,
        roles: Arc<RoleService<S, U, A>>,
        clock: Arc<dyn Clock>,
        config: DeletionConfig,
    ) -> Self {
        Self {
            tokens: TokenVault::new(Arc::clone(&storage), Arc::clone(&clock)),
            storage,
            directory,
            audit,
            credentials,
            sessions,
            roles,
            notifier: Arc::new(LoggingNotifier),
            clock,
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn DeletionNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &DeletionConfig {
        &self.config
    }

    pub async fn get_request(&self, request_id: Uuid) -> Result<Option<DeletionRequest>> {
        Ok(self.storage.get(CF_USER_DELETION_QUEUE, &request_id).await?)
    }

    /// Most recent request for `user_id`, in any state
    pub async fn latest_for_user(&self, user_id: Uuid) -> Result<Option<DeletionRequest>> {
        let request_id: Option<Uuid> = self.storage.get(CF_DELETION_BY_USER, &user_id).await?;
        match request_id {
            Some(id) => self.get_request(id).await,
            None => Ok(None),
        }
    }

    /// Latest deletion request of `user_id`, as seen by `actor`
    pub async fn deletion_status(
        &self,
        actor: &Actor,
        user_id: Uuid,
        ip_address: Option<String>,
    ) -> Result<DeletionRequest> {
        let resource = self.user_resource(user_id).await?;
        self.ensure_allowed(actor, Action::ViewDeletionStatus, &resource, ip_address)
            .await?;
        self.latest_for_user(user_id)
            .await?
            .ok_or(DeletionError::NotFound(user_id))
    }

    fn stage_save(batch: &mut dyn Batch, request: &DeletionRequest) -> Result<()> {
        batch.put(CF_USER_DELETION_QUEUE, &request.request_id, request)?;
        batch.put(CF_DELETION_BY_USER, &request.user_id, &request.request_id)?;
        Ok(())
    }

    async fn user_resource(&self, user_id: Uuid) -> Result<Resource> {
        Ok(Resource::User {
            id: user_id,
            role: self.directory.highest_role(user_id).await?,
        })
    }

    async fn ensure_allowed(
        &self,
        actor: &Actor,
        action: Action,
        resource: &Resource,
        ip_address: Option<String>,
    ) -> Result<()> {
        let decision = authorize(self.audit.as_ref(), actor, action, resource, ip_address).await?;
        if !decision.is_allowed() {
            return Err(DeletionError::Forbidden(decision.reason));
        }
        Ok(())
    }

    async fn record(&self, event: NewEvent) -> Result<()> {
        self.audit.record(event).await?;
        Ok(())
    }
}

fn deletion_row(user_id: Uuid) -> String {
    format!("deletion:{}", user_id)
}
