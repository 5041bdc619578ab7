//! Deletion queue types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_crypto::{DAY, MINUTE};

/// Cooling-off period between request and purge
pub const COOLING_OFF_SECONDS: u64 = 7 * DAY;

/// Age after which a sweep claim counts as abandoned
pub const CLAIM_TIMEOUT_SECONDS: u64 = 10 * MINUTE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStatus {
    Pending,
    Cancelled,
    Completed,
}

impl DeletionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeletionStatus::Pending => "pending",
            DeletionStatus::Cancelled => "cancelled",
            DeletionStatus::Completed => "completed",
        }
    }
}

/// A scheduled account deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRequest {
    pub request_id: Uuid,
    pub user_id: Uuid,
    pub requested_by: Uuid,
    pub reason: Option<String>,
    pub requested_at: u64,
    pub scheduled_for: u64,
    pub status: DeletionStatus,
    /// A site_admin skipped the cooling-off period
    pub override_applied: bool,
    /// Digest of the cancellation token; None for overridden requests
    pub cancellation_token_hash: Option<[u8; 32]>,
    pub reminder_1_sent: bool,
    pub reminder_3_sent: bool,
    pub reminder_6_sent: bool,
    /// Sweep worker currently purging the account
    pub claimed_by: Option<String>,
    pub claimed_at: Option<u64>,
    pub cancelled_at: Option<u64>,
    pub completed_at: Option<u64>,
}

impl DeletionRequest {
    pub fn is_pending(&self) -> bool {
        self.status == DeletionStatus::Pending
    }

    /// Pending, due, and not held by a live claim
    pub fn is_claimable(&self, now: u64, claim_timeout: u64) -> bool {
        self.is_pending()
            && self.scheduled_for <= now
            && self
                .claimed_at
                .map_or(true, |at| at + claim_timeout <= now)
    }
}

/// What `request_deletion` hands back
#[derive(Debug, Clone)]
pub struct DeletionReceipt {
    pub request: DeletionRequest,
    /// Raw cancellation token. Only present when the request was created by
    /// this call.
    pub cancellation_token: Option<String>,
    /// An existing pending request was returned unchanged
    pub existing: bool,
}

/// Outcome of one sweep over the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
}
