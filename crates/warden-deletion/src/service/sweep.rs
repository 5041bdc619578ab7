//! Scheduled purge and reminder sweeps.

use crate::{errors::*, reminders::due_reminders, types::*};
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_audit::{events, AuditRecorder, NewEvent, Severity};
use warden_identity::UserDirectory;
use warden_storage::{Storage, CF_USER_DELETION_QUEUE};

use super::{deletion_row, DeletionService};

impl<S, U, A> DeletionService<S, U, A>
where
    S: Storage + 'static,
    U: UserDirectory + 'static,
    A: AuditRecorder + 'static,
{
    /// Purge every account whose cooling-off period has ended.
    ///
    /// Each request is claimed under its row lock before any data is
    /// touched. A claim older than the claim timeout is taken over, and the
    /// purge itself is idempotent, so a crashed worker only delays a
    /// deletion.
    pub async fn process_due_deletions(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let due: Vec<(Uuid, Uuid)> = self
            .storage
            .scan_all::<DeletionRequest>(CF_USER_DELETION_QUEUE)
            .await?
            .into_iter()
            .filter(|(_, r)| r.is_claimable(now, self.config.claim_timeout_seconds))
            .map(|(_, r)| (r.request_id, r.user_id))
            .collect();

        let mut report = SweepReport::default();
        for (request_id, user_id) in due {
            let Some(claimed) = self.claim(request_id, user_id).await? else {
                continue;
            };
            report.claimed += 1;

            match self.finish_claimed(claimed).await {
                Ok(true) => report.completed += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        request_id = %request_id,
                        user_id = %user_id,
                        error = %e,
                        "Deletion purge failed; claim will lapse"
                    );
                }
            }
        }

        if report.claimed > 0 {
            info!(
                worker = %self.config.worker_id,
                claimed = report.claimed,
                completed = report.completed,
                failed = report.failed,
                "Deletion sweep finished"
            );
        }
        Ok(report)
    }

    /// Atomically mark a due request as ours
    async fn claim(&self, request_id: Uuid, user_id: Uuid) -> Result<Option<DeletionRequest>> {
        let _guard = self.storage.lock(&deletion_row(user_id)).await;
        let now = self.clock.now();
        let Some(mut request) = self.get_request(request_id).await? else {
            return Ok(None);
        };
        if !request.is_claimable(now, self.config.claim_timeout_seconds) {
            return Ok(None);
        }
        if let Some(previous) = &request.claimed_by {
            warn!(
                request_id = %request_id,
                previous = %previous,
                worker = %self.config.worker_id,
                "Taking over abandoned deletion claim"
            );
        }
        request.claimed_by = Some(self.config.worker_id.clone());
        request.claimed_at = Some(now);
        self.storage
            .put(CF_USER_DELETION_QUEUE, &request_id, &request)
            .await?;
        Ok(Some(request))
    }

    /// Purge, then mark completed unless another worker already did
    async fn finish_claimed(&self, claimed: DeletionRequest) -> Result<bool> {
        self.purge_account(claimed.user_id).await?;

        let _guard = self.storage.lock(&deletion_row(claimed.user_id)).await;
        let Some(mut request) = self.get_request(claimed.request_id).await? else {
            return Ok(false);
        };
        if !request.is_pending() {
            return Ok(false);
        }
        self.mark_completed(&mut request, None, None).await?;
        Ok(true)
    }

    /// Remove everything the account owns except its audit trail. Safe to
    /// repeat.
    pub(super) async fn purge_account(&self, user_id: Uuid) -> Result<()> {
        self.sessions.purge_user(user_id).await?;
        self.credentials.purge_user(user_id).await?;
        let promotions = self.roles.purge_user(user_id).await?;
        self.directory.purge_user(user_id).await?;
        debug!(user_id = %user_id, promotions, "Account data purged");
        Ok(())
    }

    /// Terminal transition. Caller holds the deletion row.
    pub(super) async fn mark_completed(
        &self,
        request: &mut DeletionRequest,
        completed_by: Option<Uuid>,
        ip_address: Option<String>,
    ) -> Result<()> {
        let now = self.clock.now();
        request.status = DeletionStatus::Completed;
        request.completed_at = Some(now);
        self.storage
            .put(CF_USER_DELETION_QUEUE, &request.request_id, &*request)
            .await?;

        warn!(
            user_id = %request.user_id,
            request_id = %request.request_id,
            override_applied = request.override_applied,
            "Account deleted"
        );
        self.record(
            NewEvent::new(events::DELETION_COMPLETED, Severity::Warning)
                .maybe_actor(completed_by)
                .target(request.user_id)
                .ip(ip_address)
                .details(serde_json::json!({
                    "request_id": request.request_id,
                    "requested_at": request.requested_at,
                    "override": request.override_applied,
                    "worker": request.claimed_by,
                })),
        )
        .await
    }

    /// Send reminders that came due since the last run.
    ///
    /// Flags are written before delivery, so a reminder goes out at most
    /// once. When several are overdue only the latest is delivered.
    pub async fn send_due_reminders(&self) -> Result<usize> {
        let now = self.clock.now();
        let candidates: Vec<(Uuid, Uuid)> = self
            .storage
            .scan_all::<DeletionRequest>(CF_USER_DELETION_QUEUE)
            .await?
            .into_iter()
            .filter(|(_, r)| !due_reminders(r, now).is_empty())
            .map(|(_, r)| (r.request_id, r.user_id))
            .collect();

        let mut sent = 0;
        for (request_id, user_id) in candidates {
            let guard = self.storage.lock(&deletion_row(user_id)).await;
            let Some(mut request) = self.get_request(request_id).await? else {
                continue;
            };
            let due = due_reminders(&request, now);
            let Some(latest) = due.last().copied() else {
                continue;
            };
            for reminder in &due {
                reminder.mark_sent(&mut request);
            }
            self.storage
                .put(CF_USER_DELETION_QUEUE, &request_id, &request)
                .await?;
            drop(guard);

            let user = match self.directory.get_user(user_id).await {
                Ok(user) => user,
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Reminder skipped");
                    continue;
                }
            };
            if let Err(e) = self.notifier.reminder_due(&user, &request, latest).await {
                warn!(user_id = %user_id, error = %e, "Deletion reminder not delivered");
            }
            self.record(
                NewEvent::new(events::DELETION_REMINDER, Severity::Info)
                    .target(user_id)
                    .details(serde_json::json!({
                        "request_id": request_id,
                        "day": latest.day(),
                        "scheduled_for": request.scheduled_for,
                    })),
            )
            .await?;
            sent += 1;
        }
        Ok(sent)
    }
}
