use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use warden_policy::Role;
use warden_roles::{Demotion, PromotionFilter, PromotionRequest, PromotionStatus, VoteDecision};

use super::helpers::{format_timestamp_rfc3339, ok, ApiResult};
use crate::{
    error::ApiError,
    extractors::{AuthenticatedUser, Payload},
    request_context::RequestContext,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct PromoteRequest {
    pub user_id: Uuid,
    pub from_role: Role,
    pub to_role: Role,
}

#[derive(Debug, Deserialize)]
pub struct ApprovePromotionRequest {
    pub request_id: Uuid,
    #[serde(default = "default_decision")]
    pub decision: VoteDecision,
}

fn default_decision() -> VoteDecision {
    VoteDecision::Approve
}

#[derive(Debug, Deserialize)]
pub struct DemoteRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PromotionsQuery {
    pub status: Option<String>,
    pub target_user_id: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PromotionView {
    pub request_id: Uuid,
    pub target_user_id: Uuid,
    pub from_role: Role,
    pub to_role: Role,
    pub initiated_by: Uuid,
    pub status: PromotionStatus,
    pub approvals: u32,
    pub rejections: u32,
    pub required_approvals: u32,
    pub created_at: String,
    pub expires_at: String,
    pub decided_at: Option<String>,
}

impl From<PromotionRequest> for PromotionView {
    fn from(request: PromotionRequest) -> Self {
        Self {
            request_id: request.request_id,
            target_user_id: request.target_user_id,
            from_role: request.from_role,
            to_role: request.to_role,
            initiated_by: request.initiated_by,
            status: request.status,
            approvals: request.approvals,
            rejections: request.rejections,
            required_approvals: request.required_approvals,
            created_at: format_timestamp_rfc3339(request.created_at),
            expires_at: format_timestamp_rfc3339(request.expires_at),
            decided_at: request.decided_at.map(format_timestamp_rfc3339),
        }
    }
}

impl PromotionsQuery {
    fn into_filter(self) -> Result<PromotionFilter, ApiError> {
        let status = match self.status.as_deref() {
            None | Some("") => None,
            Some("pending") => Some(PromotionStatus::Pending),
            Some("approved") => Some(PromotionStatus::Approved),
            Some("rejected") => Some(PromotionStatus::Rejected),
            Some("expired") => Some(PromotionStatus::Expired),
            Some(other) => {
                return Err(ApiError::field("status", format!("Unknown status: {}", other)))
            }
        };
        let target_user_id = self
            .target_user_id
            .map(|id| Uuid::parse_str(&id))
            .transpose()
            .map_err(|_| ApiError::field("target_user_id", "Must be a UUID"))?;
        let limit = self
            .limit
            .map(|l| l.parse::<usize>())
            .transpose()
            .map_err(|_| ApiError::field("limit", "Must be a positive integer"))?;
        Ok(PromotionFilter {
            status,
            target_user_id,
            limit,
        })
    }
}

/// POST /auth/roles/promote
pub async fn promote(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    auth: AuthenticatedUser,
    Payload(req): Payload<PromoteRequest>,
) -> ApiResult<PromotionView> {
    let request = state
        .roles
        .initiate_promotion(&auth.actor, req.user_id, req.from_role, req.to_role, ctx.ip())
        .await?;
    ok(request.into())
}

/// POST /auth/roles/approve-promotion
pub async fn approve_promotion(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    auth: AuthenticatedUser,
    Payload(req): Payload<ApprovePromotionRequest>,
) -> ApiResult<PromotionView> {
    let request = state
        .roles
        .vote(&auth.actor, req.request_id, req.decision, ctx.ip())
        .await?;
    ok(request.into())
}

/// POST /auth/roles/demote
pub async fn demote(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    auth: AuthenticatedUser,
    Payload(req): Payload<DemoteRequest>,
) -> ApiResult<Demotion> {
    let demotion = state.roles.demote(&auth.actor, req.user_id, ctx.ip()).await?;
    ok(demotion)
}

/// GET /auth/roles/promotions
pub async fn list_promotions(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    auth: AuthenticatedUser,
    Query(query): Query<PromotionsQuery>,
) -> ApiResult<Vec<PromotionView>> {
    let filter = query.into_filter()?;
    let requests = state
        .roles
        .list_promotions(&auth.actor, &filter, ctx.ip())
        .await?;
    ok(requests.into_iter().map(PromotionView::from).collect())
}
