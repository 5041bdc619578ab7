//! Promotion requests and quorum voting.

use crate::{errors::*, quorum::tally, types::*};
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_audit::{events, AuditRecorder, NewEvent, Severity};
use warden_identity::{assignments, IdentityError, RoleAssignment, UserDirectory};
use warden_policy::{Action, Actor, Resource, Role};
use warden_storage::{child_key, BatchExt, Storage, CF_APPROVAL_VOTES, CF_ROLE_PROMOTION_APPROVALS};

use super::{promotion_row, user_row, RoleService};

impl<S, U, A> RoleService<S, U, A>
where
    S: Storage + 'static,
    U: UserDirectory + 'static,
    A: AuditRecorder + 'static,
{
    /// Open a promotion request for `target_user_id`.
    ///
    /// A site_admin granting site_admin is approved on the spot; promotion
    /// to admin waits for a quorum of votes.
    pub async fn initiate_promotion(
        &self,
        actor: &Actor,
        target_user_id: Uuid,
        from_role: Role,
        to_role: Role,
        ip_address: Option<String>,
    ) -> Result<PromotionRequest> {
        let target = self.directory.get_user(target_user_id).await?;
        let resource = self.user_resource(target_user_id).await?;
        let action = if to_role == Role::SiteAdmin {
            Action::GrantSiteAdmin
        } else {
            Action::InitiatePromotion
        };
        self.ensure_allowed(actor, action, &resource, ip_address.clone())
            .await?;

        if !target.is_active() {
            return Err(RoleError::InvalidOperation(
                "Only active accounts can be promoted".to_string(),
            ));
        }
        if to_role <= from_role {
            return Err(RoleError::InvalidOperation(format!(
                "Cannot promote from {} to {}",
                from_role, to_role
            )));
        }

        let _guard = self.storage.lock(&user_row(target_user_id)).await;
        let rows = assignments::load(self.storage.as_ref(), target_user_id).await?;
        let current = assignments::highest_role(&rows);
        if current != from_role {
            return Err(RoleError::Conflict(format!(
                "Target currently holds {}, not {}",
                current, from_role
            )));
        }

        let now = self.clock.now();
        let duplicate = self
            .storage
            .scan_all::<PromotionRequest>(CF_ROLE_PROMOTION_APPROVALS)
            .await?
            .into_iter()
            .any(|(_, r)| {
                r.target_user_id == target_user_id
                    && r.to_role == to_role
                    && r.is_pending()
                    && r.expires_at > now
            });
        if duplicate {
            return Err(RoleError::Conflict(format!(
                "A promotion to {} is already pending for this user",
                to_role
            )));
        }

        let auto_approved = to_role == Role::SiteAdmin;
        let request = PromotionRequest {
            request_id: Uuid::new_v4(),
            target_user_id,
            from_role,
            to_role,
            initiated_by: actor.user_id,
            required_approvals: if auto_approved { 0 } else { ADMIN_QUORUM },
            approvals: 0,
            rejections: 0,
            status: if auto_approved {
                PromotionStatus::Approved
            } else {
                PromotionStatus::Pending
            },
            created_at: now,
            expires_at: now + PROMOTION_TTL_SECONDS,
            decided_at: auto_approved.then_some(now),
        };

        let mut batch = self.storage.batch();
        batch.put(CF_ROLE_PROMOTION_APPROVALS, &request.request_id, &request)?;
        if auto_approved {
            assignments::stage_grant(
                batch.as_mut(),
                &rows,
                target_user_id,
                to_role,
                Some(actor.user_id),
                now,
            )?;
        }
        batch.commit().await?;

        info!(
            request_id = %request.request_id,
            target = %target_user_id,
            from = %from_role,
            to = %to_role,
            auto_approved,
            "Promotion initiated"
        );
        self.record(
            NewEvent::new(events::PROMOTION_INITIATED, Severity::Warning)
                .actor(actor.user_id)
                .target(target_user_id)
                .ip(ip_address.clone())
                .details(serde_json::json!({
                    "request_id": request.request_id,
                    "from_role": from_role.as_str(),
                    "to_role": to_role.as_str(),
                    "auto_approved": auto_approved,
                })),
        )
        .await?;
        if auto_approved {
            self.record_decision(&request, Some(actor.user_id), ip_address)
                .await?;
        }

        Ok(request)
    }

    /// Cast a vote. The vote, the new tally, the status transition and any
    /// role grant commit together.
    pub async fn vote(
        &self,
        actor: &Actor,
        request_id: Uuid,
        decision: VoteDecision,
        ip_address: Option<String>,
    ) -> Result<PromotionRequest> {
        let guard = self.storage.lock(&promotion_row(request_id)).await;
        let mut request = self.get_promotion(request_id).await?;

        let resource = self.user_resource(request.target_user_id).await?;
        self.ensure_allowed(actor, Action::VotePromotion, &resource, ip_address.clone())
            .await?;

        if !request.is_pending() {
            return Err(RoleError::Conflict(format!(
                "Request is already {}",
                request.status.as_str()
            )));
        }
        let now = self.clock.now();
        if now >= request.expires_at {
            self.expire(&mut request, now).await?;
            return Err(RoleError::Conflict("Request has expired".to_string()));
        }

        let vote_key = child_key(&request_id, &actor.user_id);
        if self.storage.exists(CF_APPROVAL_VOTES, &vote_key).await? {
            return Err(RoleError::Conflict(
                "Voter has already voted on this request".to_string(),
            ));
        }

        let vote = ApprovalVote {
            request_id,
            voter_id: actor.user_id,
            voter_role: actor.role,
            decision,
            cast_at: now,
        };
        let mut votes = self.votes(request_id).await?;
        votes.push(vote.clone());
        let counts = tally(&votes, request.required_approvals);
        request.approvals = counts.approvals;
        request.rejections = counts.rejections;
        let outcome = counts.outcome(request.required_approvals);
        if let Some(status) = outcome {
            request.status = status;
            request.decided_at = Some(now);
        }

        let mut batch = self.storage.batch();
        batch.put(CF_APPROVAL_VOTES, &vote_key, &vote)?;
        batch.put(CF_ROLE_PROMOTION_APPROVALS, &request_id, &request)?;
        let user_guard = if outcome == Some(PromotionStatus::Approved) {
            let user_guard = self.storage.lock(&user_row(request.target_user_id)).await;
            let rows = self.grantable_rows(&request).await?;
            assignments::stage_grant(
                batch.as_mut(),
                &rows,
                request.target_user_id,
                request.to_role,
                Some(actor.user_id),
                now,
            )?;
            Some(user_guard)
        } else {
            None
        };
        batch.commit().await?;
        drop(user_guard);
        drop(guard);

        debug!(
            request_id = %request_id,
            voter = %actor.user_id,
            decision = ?decision,
            approvals = request.approvals,
            rejections = request.rejections,
            "Vote recorded"
        );
        self.record(
            NewEvent::new(events::PROMOTION_VOTE, Severity::Info)
                .actor(actor.user_id)
                .target(request.target_user_id)
                .ip(ip_address.clone())
                .details(serde_json::json!({
                    "request_id": request_id,
                    "decision": decision,
                    "voter_role": actor.role.as_str(),
                    "approvals": request.approvals,
                    "rejections": request.rejections,
                })),
        )
        .await?;
        if outcome.is_some() {
            self.record_decision(&request, Some(actor.user_id), ip_address)
                .await?;
        }

        Ok(request)
    }

    /// Current assignments of a target that may still receive the grant.
    /// Caller holds the target's user row.
    async fn grantable_rows(&self, request: &PromotionRequest) -> Result<Vec<RoleAssignment>> {
        let target = match self.directory.get_user(request.target_user_id).await {
            Ok(user) => user,
            Err(IdentityError::NotFound(_)) => {
                return Err(RoleError::Conflict(
                    "Target account no longer exists".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        if !target.is_active() {
            return Err(RoleError::Conflict(
                "Only active accounts can be promoted".to_string(),
            ));
        }

        let rows = assignments::load(self.storage.as_ref(), request.target_user_id).await?;
        let current = assignments::highest_role(&rows);
        if current != request.from_role {
            return Err(RoleError::Conflict(format!(
                "Target now holds {}, not {}",
                current, request.from_role
            )));
        }
        Ok(rows)
    }

    async fn record_decision(
        &self,
        request: &PromotionRequest,
        actor_id: Option<Uuid>,
        ip_address: Option<String>,
    ) -> Result<()> {
        let (event_type, severity) = match request.status {
            PromotionStatus::Approved => (events::PROMOTION_APPROVED, Severity::Warning),
            PromotionStatus::Rejected => (events::PROMOTION_REJECTED, Severity::Info),
            PromotionStatus::Expired => (events::PROMOTION_EXPIRED, Severity::Info),
            PromotionStatus::Pending => return Ok(()),
        };
        if request.status == PromotionStatus::Approved {
            warn!(
                request_id = %request.request_id,
                target = %request.target_user_id,
                role = %request.to_role,
                "Role granted"
            );
        }
        self.record(
            NewEvent::new(event_type, severity)
                .maybe_actor(actor_id)
                .target(request.target_user_id)
                .ip(ip_address)
                .details(serde_json::json!({
                    "request_id": request.request_id,
                    "from_role": request.from_role.as_str(),
                    "to_role": request.to_role.as_str(),
                    "approvals": request.approvals,
                    "rejections": request.rejections,
                })),
        )
        .await
    }

    /// Caller holds the request's row lock
    async fn expire(&self, request: &mut PromotionRequest, now: u64) -> Result<()> {
        request.status = PromotionStatus::Expired;
        request.decided_at = Some(now);
        self.storage
            .put(CF_ROLE_PROMOTION_APPROVALS, &request.request_id, &*request)
            .await?;
        info!(request_id = %request.request_id, "Promotion request expired");
        self.record_decision(request, None, None).await
    }

    /// Expire pending requests past their deadline
    pub async fn expire_stale_requests(&self) -> Result<usize> {
        let now = self.clock.now();
        let stale: Vec<Uuid> = self
            .storage
            .scan_all::<PromotionRequest>(CF_ROLE_PROMOTION_APPROVALS)
            .await?
            .into_iter()
            .filter(|(_, r)| r.is_pending() && r.expires_at <= now)
            .map(|(_, r)| r.request_id)
            .collect();

        let mut expired = 0;
        for request_id in stale {
            let _guard = self.storage.lock(&promotion_row(request_id)).await;
            // A vote may have decided it since the scan
            let mut request = self.get_promotion(request_id).await?;
            if request.is_pending() {
                self.expire(&mut request, now).await?;
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// Expire every pending request that targets `user_id`. Safe to repeat.
    pub async fn purge_user(&self, user_id: Uuid) -> Result<usize> {
        let pending: Vec<Uuid> = self
            .storage
            .scan_all::<PromotionRequest>(CF_ROLE_PROMOTION_APPROVALS)
            .await?
            .into_iter()
            .filter(|(_, r)| r.target_user_id == user_id && r.is_pending())
            .map(|(_, r)| r.request_id)
            .collect();

        let now = self.clock.now();
        let mut expired = 0;
        for request_id in pending {
            let _guard = self.storage.lock(&promotion_row(request_id)).await;
            let mut request = self.get_promotion(request_id).await?;
            if request.is_pending() {
                self.expire(&mut request, now).await?;
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// Requests matching `filter`, newest first
    pub async fn list_promotions(
        &self,
        actor: &Actor,
        filter: &PromotionFilter,
        ip_address: Option<String>,
    ) -> Result<Vec<PromotionRequest>> {
        self.ensure_allowed(actor, Action::ViewPromotions, &Resource::System, ip_address)
            .await?;

        let mut requests: Vec<PromotionRequest> = self
            .storage
            .scan_all::<PromotionRequest>(CF_ROLE_PROMOTION_APPROVALS)
            .await?
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| filter.matches(r))
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        requests.truncate(filter.limit.unwrap_or(PromotionFilter::DEFAULT_LIMIT));
        Ok(requests)
    }
}
