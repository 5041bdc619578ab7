//! Role engine type definitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_crypto::HOUR;
use warden_policy::Role;

/// Pending requests lapse after this long
pub const PROMOTION_TTL_SECONDS: u64 = 72 * HOUR;

/// Admin votes needed to promote to admin. One site_admin vote counts as
/// the full quorum.
pub const ADMIN_QUORUM: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl PromotionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PromotionStatus::Pending => "pending",
            PromotionStatus::Approved => "approved",
            PromotionStatus::Rejected => "rejected",
            PromotionStatus::Expired => "expired",
        }
    }
}

/// A request to raise a user's role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRequest {
    pub request_id: Uuid,
    pub target_user_id: Uuid,
    pub from_role: Role,
    pub to_role: Role,
    pub initiated_by: Uuid,
    /// Weighted approvals needed; 0 when auto-approved
    pub required_approvals: u32,
    /// Weighted approvals so far
    pub approvals: u32,
    /// Weighted rejections so far
    pub rejections: u32,
    pub status: PromotionStatus,
    pub created_at: u64,
    pub expires_at: u64,
    pub decided_at: Option<u64>,
}

impl PromotionRequest {
    pub fn is_pending(&self) -> bool {
        self.status == PromotionStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteDecision {
    Approve,
    Reject,
}

/// One voter's decision on one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalVote {
    pub request_id: Uuid,
    pub voter_id: Uuid,
    /// Voter's highest role when the vote was cast
    pub voter_role: Role,
    pub decision: VoteDecision,
    pub cast_at: u64,
}

/// Filters for listing promotion requests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromotionFilter {
    pub status: Option<PromotionStatus>,
    pub target_user_id: Option<Uuid>,
    pub limit: Option<usize>,
}

impl PromotionFilter {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn matches(&self, request: &PromotionRequest) -> bool {
        self.status.map_or(true, |s| request.status == s)
            && self
                .target_user_id
                .map_or(true, |id| request.target_user_id == id)
    }
}

/// Result of a completed demotion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demotion {
    pub user_id: Uuid,
    /// Roles that were deactivated
    pub revoked: Vec<Role>,
    /// Highest role left, always the user tier
    pub remaining: Role,
}
