//! Notification seam for the deletion queue.

use crate::{errors::Result, reminders::Reminder, types::DeletionRequest};
use async_trait::async_trait;
use tracing::info;
use warden_identity::User;

/// Delivers deletion notices to the account owner
#[async_trait]
pub trait DeletionNotifier: Send + Sync {
    /// A request was scheduled; `raw_token` cancels it
    async fn deletion_scheduled(
        &self,
        user: &User,
        request: &DeletionRequest,
        raw_token: &str,
    ) -> Result<()>;

    async fn reminder_due(&self, user: &User, request: &DeletionRequest, reminder: Reminder)
        -> Result<()>;
}

/// Notifier that only logs. The token itself is never written out.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl DeletionNotifier for LoggingNotifier {
    async fn deletion_scheduled(
        &self,
        user: &User,
        request: &DeletionRequest,
        _raw_token: &str,
    ) -> Result<()> {
        info!(
            user_id = %user.user_id,
            request_id = %request.request_id,
            scheduled_for = request.scheduled_for,
            "Deletion scheduled; cancellation token ready for delivery"
        );
        Ok(())
    }

    async fn reminder_due(
        &self,
        user: &User,
        request: &DeletionRequest,
        reminder: Reminder,
    ) -> Result<()> {
        info!(
            user_id = %user.user_id,
            request_id = %request.request_id,
            day = reminder.day(),
            scheduled_for = request.scheduled_for,
            "Deletion reminder"
        );
        Ok(())
    }
}
