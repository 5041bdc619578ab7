//! Vote counting.
//!
//! Approval and rejection are symmetric: either side wins once its
//! weighted count reaches the request's quorum. A site_admin vote weighs
//! as much as the whole quorum.

use crate::types::*;
use std::collections::HashSet;
use uuid::Uuid;
use warden_policy::Role;

/// Weighted vote counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub approvals: u32,
    pub rejections: u32,
}

impl Tally {
    /// The decided status, or `None` while neither side has quorum
    pub fn outcome(&self, required: u32) -> Option<PromotionStatus> {
        if self.approvals >= required {
            Some(PromotionStatus::Approved)
        } else if self.rejections >= required {
            Some(PromotionStatus::Rejected)
        } else {
            None
        }
    }
}

fn weight(role: Role, required: u32) -> u32 {
    match role {
        Role::SiteAdmin => required,
        Role::Admin => 1,
        Role::User => 0,
    }
}

/// Count votes; a voter is counted once, by their first vote
pub fn tally(votes: &[ApprovalVote], required: u32) -> Tally {
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut result = Tally::default();
    for vote in votes {
        if !seen.insert(vote.voter_id) {
            continue;
        }
        let w = weight(vote.voter_role, required);
        match vote.decision {
            VoteDecision::Approve => result.approvals += w,
            VoteDecision::Reject => result.rejections += w,
        }
    }
    result
}
