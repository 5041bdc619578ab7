//! Demotion to the user tier.

use crate::{errors::*, types::*};
use tracing::warn;
use uuid::Uuid;
use warden_audit::{events, AuditRecorder, NewEvent, Severity};
use warden_identity::{assignments, UserDirectory};
use warden_policy::{Action, Actor, Resource, Role};
use warden_storage::Storage;

use super::{user_row, RoleService};

impl<S, U, A> RoleService<S, U, A>
where
    S: Storage + 'static,
    U: UserDirectory + 'static,
    A: AuditRecorder + 'static,
{
    /// Deactivate every admin-tier role of `target_user_id`.
    ///
    /// site_admin is never demoted, whoever asks; the account can only be
    /// deleted.
    pub async fn demote(
        &self,
        actor: &Actor,
        target_user_id: Uuid,
        ip_address: Option<String>,
    ) -> Result<Demotion> {
        self.directory.get_user(target_user_id).await?;

        let guard = self.storage.lock(&user_row(target_user_id)).await;
        let rows = assignments::load(self.storage.as_ref(), target_user_id).await?;
        let current = assignments::highest_role(&rows);
        if current == Role::SiteAdmin {
            return Err(RoleError::InvalidOperation(
                "site_admin cannot be demoted; delete the account instead".to_string(),
            ));
        }

        let resource = Resource::User {
            id: target_user_id,
            role: current,
        };
        self.ensure_allowed(actor, Action::Demote, &resource, ip_address.clone())
            .await?;
        if current == Role::User {
            return Err(RoleError::InvalidOperation(
                "User holds no admin-tier role".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut batch = self.storage.batch();
        let mut revoked = Vec::new();
        for assignment in rows.iter().filter(|a| a.active && a.role.is_admin_tier()) {
            assignments::stage_revoke(batch.as_mut(), assignment, now)?;
            revoked.push(assignment.role);
        }
        batch.commit().await?;
        drop(guard);

        warn!(
            actor_id = %actor.user_id,
            target = %target_user_id,
            revoked = ?revoked,
            "User demoted"
        );
        self.record(
            NewEvent::new(events::ROLE_DEMOTED, Severity::Warning)
                .actor(actor.user_id)
                .target(target_user_id)
                .ip(ip_address)
                .details(serde_json::json!({
                    "revoked": revoked.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
                    "from_role": current.as_str(),
                })),
        )
        .await?;

        Ok(Demotion {
            user_id: target_user_id,
            revoked,
            remaining: Role::User,
        })
    }
}
