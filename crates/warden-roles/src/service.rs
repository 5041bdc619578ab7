//! Role engine service implementation.

use crate::{errors::*, types::*};
use std::sync::Arc;
use uuid::Uuid;
use warden_audit::{authorize, AuditRecorder, NewEvent};
use warden_crypto::Clock;
use warden_identity::UserDirectory;
use warden_policy::{Action, Actor, Resource};
use warden_storage::{Storage, CF_APPROVAL_VOTES, CF_ROLE_PROMOTION_APPROVALS};

mod demotion;
mod promotion;

/// Promotion and demotion workflows
pub struct RoleService<S: Storage, U: UserDirectory, A: AuditRecorder> {
    storage: Arc<S>,
    directory: Arc<U>,
    audit: Arc<A>,
    clock: Arc<dyn Clock>,
}

impl<S, U, A> RoleService<S, U, A>
where
    S: Storage + 'static,
    U: UserDirectory + 'static,
    A: AuditRecorder + 'static,
{
    pub fn new(storage: Arc<S>, directory: Arc<U>, audit: Arc<A>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            directory,
            audit,
            clock,
        }
    }

    pub async fn get_promotion(&self, request_id: Uuid) -> Result<PromotionRequest> {
        self.storage
            .get(CF_ROLE_PROMOTION_APPROVALS, &request_id)
            .await?
            .ok_or(RoleError::NotFound(request_id))
    }

    /// Votes cast on a request, in no particular order
    pub async fn votes(&self, request_id: Uuid) -> Result<Vec<ApprovalVote>> {
        let rows: Vec<(Vec<u8>, ApprovalVote)> = self
            .storage
            .get_by_prefix(CF_APPROVAL_VOTES, request_id.as_bytes())
            .await?;
        Ok(rows.into_iter().map(|(_, v)| v).collect())
    }

    /// `resource` for an action on `user_id`, with their current highest role
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
            return Err(RoleError::Forbidden(decision.reason));
        }
        Ok(())
    }

    async fn record(&self, event: NewEvent) -> Result<()> {
        self.audit.record(event).await?;
        Ok(())
    }
}

/// Same row the directory locks for account updates
fn user_row(user_id: Uuid) -> String {
    format!("user:{}", user_id)
}

fn promotion_row(request_id: Uuid) -> String {
    format!("promotion:{}", request_id)
}
