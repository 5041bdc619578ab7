//! Requesting and cancelling deletions.

use crate::{errors::*, types::*};
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_audit::{events, AuditRecorder, NewEvent, Severity};
use warden_credentials::{CredentialError, TokenType, TokenVault};
use warden_crypto::{constant_time_compare, token_hash};
use warden_identity::{UserDirectory, UserStatus};
use warden_policy::{Action, Actor};
use warden_storage::{Storage, CF_USER_DELETION_QUEUE};

use super::{deletion_row, DeletionService};

impl<S, U, A> DeletionService<S, U, A>
where
    S: Storage + 'static,
    U: UserDirectory + 'static,
    A: AuditRecorder + 'static,
{
    /// Schedule deletion of `user_id`.
    ///
    /// The account is locked out immediately and purged once the cooling-off
    /// period ends. A pending request is returned as is, unless
    /// `override_cooling_off` is set, which purges the account now.
    pub async fn request_deletion(
        &self,
        actor: &Actor,
        user_id: Uuid,
        reason: Option<String>,
        override_cooling_off: bool,
        ip_address: Option<String>,
    ) -> Result<DeletionReceipt> {
        let user = self.directory.get_user(user_id).await?;
        let resource = self.user_resource(user_id).await?;
        self.ensure_allowed(actor, Action::RequestDeletion, &resource, ip_address.clone())
            .await?;
        if override_cooling_off {
            self.ensure_allowed(actor, Action::OverrideDeletion, &resource, ip_address.clone())
                .await?;
        }

        let guard = self.storage.lock(&deletion_row(user_id)).await;
        let now = self.clock.now();

        if let Some(mut existing) = self.latest_for_user(user_id).await?.filter(|r| r.is_pending()) {
            if !override_cooling_off {
                debug!(user_id = %user_id, request_id = %existing.request_id, "Deletion already pending");
                return Ok(DeletionReceipt {
                    request: existing,
                    cancellation_token: None,
                    existing: true,
                });
            }
            existing.override_applied = true;
            existing.scheduled_for = now;
            self.purge_account(user_id).await?;
            self.mark_completed(&mut existing, Some(actor.user_id), ip_address)
                .await?;
            drop(guard);
            return Ok(DeletionReceipt {
                request: existing,
                cancellation_token: None,
                existing: true,
            });
        }

        let mut request = DeletionRequest {
            request_id: Uuid::new_v4(),
            user_id,
            requested_by: actor.user_id,
            reason,
            requested_at: now,
            scheduled_for: if override_cooling_off {
                now
            } else {
                now + self.config.cooling_off_seconds
            },
            status: DeletionStatus::Pending,
            override_applied: override_cooling_off,
            cancellation_token_hash: None,
            reminder_1_sent: false,
            reminder_3_sent: false,
            reminder_6_sent: false,
            claimed_by: None,
            claimed_at: None,
            cancelled_at: None,
            completed_at: None,
        };

        let mut batch = self.storage.batch();
        let raw_token = if override_cooling_off {
            None
        } else {
            let raw = TokenVault::<S>::generate_raw()?;
            let record = TokenVault::<S>::new_record(
                &raw,
                user_id,
                TokenType::Cancellation,
                self.config.cooling_off_seconds,
                None,
                now,
            );
            TokenVault::<S>::stage(batch.as_mut(), &record)?;
            request.cancellation_token_hash = Some(record.token_hash);
            Some(raw)
        };
        Self::stage_save(batch.as_mut(), &request)?;
        batch.commit().await?;

        let self_requested = actor.user_id == user_id;
        info!(
            user_id = %user_id,
            request_id = %request.request_id,
            requested_by = %actor.user_id,
            scheduled_for = request.scheduled_for,
            override_cooling_off,
            "Deletion requested"
        );
        self.record(
            NewEvent::new(events::DELETION_REQUESTED, Severity::Warning)
                .actor(actor.user_id)
                .target(user_id)
                .ip(ip_address.clone())
                .details(serde_json::json!({
                    "request_id": request.request_id,
                    "scheduled_for": request.scheduled_for,
                    "self_requested": self_requested,
                    "override": override_cooling_off,
                    "reason": request.reason,
                })),
        )
        .await?;

        if override_cooling_off {
            self.purge_account(user_id).await?;
            self.mark_completed(&mut request, Some(actor.user_id), ip_address)
                .await?;
            drop(guard);
            return Ok(DeletionReceipt {
                request,
                cancellation_token: None,
                existing: false,
            });
        }

        self.directory
            .set_status(user_id, UserStatus::PendingDeletion)
            .await?;
        drop(guard);

        let revoked = self
            .sessions
            .revoke_all(user_id, "deletion_requested", Some(actor.user_id))
            .await?;
        debug!(user_id = %user_id, revoked, "Sessions ended for pending deletion");

        if let Some(raw) = &raw_token {
            if let Err(e) = self.notifier.deletion_scheduled(&user, &request, raw).await {
                warn!(user_id = %user_id, error = %e, "Deletion notice not delivered");
            }
        }

        Ok(DeletionReceipt {
            request,
            cancellation_token: raw_token,
            existing: false,
        })
    }

    /// Cancel the pending deletion of `user_id` with its cancellation token.
    ///
    /// The token is consumed; the account becomes active again.
    pub async fn cancel_deletion(
        &self,
        user_id: Uuid,
        raw_token: &str,
        ip_address: Option<String>,
    ) -> Result<DeletionRequest> {
        let guard = self.storage.lock(&deletion_row(user_id)).await;
        let mut request = self.cancellable(user_id).await?;

        let digest = token_hash(raw_token);
        let bound = request
            .cancellation_token_hash
            .is_some_and(|expected| constant_time_compare(&expected, &digest));
        if !bound {
            return Err(DeletionError::InvalidToken);
        }
        self.tokens
            .consume_for(raw_token, TokenType::Cancellation, user_id)
            .await
            .map_err(|e| match e {
                CredentialError::InvalidToken => DeletionError::InvalidToken,
                other => other.into(),
            })?;

        self.mark_cancelled(&mut request).await?;
        drop(guard);

        self.record(
            NewEvent::new(events::DELETION_CANCELLED, Severity::Info)
                .actor(user_id)
                .target(user_id)
                .ip(ip_address)
                .details(serde_json::json!({
                    "request_id": request.request_id,
                    "via": "token",
                })),
        )
        .await?;
        Ok(request)
    }

    /// Cancel on the owner's behalf without the token
    pub async fn cancel_deletion_for(
        &self,
        actor: &Actor,
        user_id: Uuid,
        ip_address: Option<String>,
    ) -> Result<DeletionRequest> {
        let resource = self.user_resource(user_id).await?;
        self.ensure_allowed(actor, Action::CancelDeletion, &resource, ip_address.clone())
            .await?;

        let guard = self.storage.lock(&deletion_row(user_id)).await;
        let mut request = self.cancellable(user_id).await?;
        self.mark_cancelled(&mut request).await?;
        drop(guard);

        self.record(
            NewEvent::new(events::DELETION_CANCELLED, Severity::Warning)
                .actor(actor.user_id)
                .target(user_id)
                .ip(ip_address)
                .details(serde_json::json!({
                    "request_id": request.request_id,
                    "via": "administrator",
                })),
        )
        .await?;
        Ok(request)
    }

    /// Pending request not yet taken by a sweep. Caller holds the deletion row.
    async fn cancellable(&self, user_id: Uuid) -> Result<DeletionRequest> {
        let request = self
            .latest_for_user(user_id)
            .await?
            .ok_or(DeletionError::NotFound(user_id))?;
        if !request.is_pending() {
            return Err(DeletionError::Conflict(format!(
                "Deletion request is already {}",
                request.status.as_str()
            )));
        }
        let now = self.clock.now();
        let claimed = request
            .claimed_at
            .is_some_and(|at| at + self.config.claim_timeout_seconds > now);
        if claimed || request.scheduled_for <= now {
            return Err(DeletionError::Conflict(
                "Deletion is already being processed".to_string(),
            ));
        }
        Ok(request)
    }

    async fn mark_cancelled(&self, request: &mut DeletionRequest) -> Result<()> {
        request.status = DeletionStatus::Cancelled;
        request.cancelled_at = Some(self.clock.now());
        self.storage
            .put(CF_USER_DELETION_QUEUE, &request.request_id, &*request)
            .await?;
        self.tokens
            .invalidate_for_user(request.user_id, TokenType::Cancellation)
            .await?;
        self.directory
            .set_status(request.user_id, UserStatus::Active)
            .await?;
        info!(user_id = %request.user_id, request_id = %request.request_id, "Deletion cancelled");
        Ok(())
    }
}
