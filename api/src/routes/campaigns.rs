//! Campaign lifecycle endpoints

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use std::sync::Arc;
use uuid::Uuid;

use admeter_billing::Actor;

use crate::middleware::auth::{Identity, Role};
use crate::models::*;
use crate::ApiState;

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/", get(list_campaigns).post(create_campaign))
        .route("/:id", get(get_campaign))
        .route("/:id/verify", post(verify_campaign))
        .route("/:id/launch", post(launch_campaign))
        .route("/:id/pause", post(pause_campaign))
        .route("/:id/resume", post(resume_campaign))
        .route("/:id/stop", post(stop_campaign))
        .route("/:id/settlement", get(get_settlement))
}

fn actor(identity: Identity) -> Actor {
    match identity.role {
        Role::Admin => Actor::Admin(identity.user_id),
        _ => Actor::Advertiser(identity.user_id),
    }
}

/// Create a draft campaign owned by the caller
#[utoipa::path(
    post,
    path = "/api/v1/campaigns",
    request_body = CampaignCreate,
    responses(
        (status = 200, description = "Draft campaign", body = CampaignView),
        (status = 400, description = "Invalid budget or rate card")
    ),
    tag = "campaigns",
    security(("bearer" = []))
)]
pub async fn create_campaign(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Json(input): Json<CampaignCreate>,
) -> Result<Json<ApiResponse<CampaignView>>, ApiError> {
    let campaign = state
        .platform
        .campaigns
        .create(identity.user_id, input.into())?;
    Ok(Json(ApiResponse::success(campaign.into())))
}

/// Campaigns owned by the caller
#[utoipa::path(
    get,
    path = "/api/v1/campaigns",
    responses(
        (status = 200, description = "Campaign list", body = [CampaignView])
    ),
    tag = "campaigns",
    security(("bearer" = []))
)]
pub async fn list_campaigns(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<Vec<CampaignView>>>, ApiError> {
    let campaigns = state.platform.campaigns.for_advertiser(identity.user_id);
    Ok(Json(ApiResponse::success(
        campaigns.into_iter().map(Into::into).collect(),
    )))
}

/// Campaign by id
#[utoipa::path(
    get,
    path = "/api/v1/campaigns/{id}",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign", body = CampaignView),
        (status = 404, description = "Campaign not found")
    ),
    tag = "campaigns",
    security(("bearer" = []))
)]
pub async fn get_campaign(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CampaignView>>, ApiError> {
    let campaign = state.platform.campaigns.get(id)?;
    identity.authorize_owner(campaign.advertiser_id)?;
    Ok(Json(ApiResponse::success(campaign.into())))
}

/// Mark a draft campaign as verified (admin workflow)
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{id}/verify",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Verified campaign", body = CampaignView),
        (status = 403, description = "Admin role required")
    ),
    tag = "campaigns",
    security(("bearer" = []))
)]
pub async fn verify_campaign(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CampaignView>>, ApiError> {
    identity.require_admin()?;
    let campaign = state.platform.campaigns.verify(id)?;
    Ok(Json(ApiResponse::success(campaign.into())))
}

/// Launch a verified draft; debits the upfront deposit
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{id}/launch",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Active campaign", body = CampaignView),
        (status = 409, description = "Wrong state or insufficient balance")
    ),
    tag = "campaigns",
    security(("bearer" = []))
)]
pub async fn launch_campaign(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CampaignView>>, ApiError> {
    let campaign = state.platform.campaigns.get(id)?;
    identity.authorize_owner(campaign.advertiser_id)?;
    let campaign = state.platform.campaigns.launch(id)?;
    Ok(Json(ApiResponse::success(campaign.into())))
}

/// Pause an active campaign
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{id}/pause",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    request_body = PauseRequest,
    responses(
        (status = 200, description = "Paused campaign", body = CampaignView),
        (status = 409, description = "Not active")
    ),
    tag = "campaigns",
    security(("bearer" = []))
)]
pub async fn pause_campaign(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(input): Json<PauseRequest>,
) -> Result<Json<ApiResponse<CampaignView>>, ApiError> {
    let campaign = state.platform.campaigns.get(id)?;
    identity.authorize_owner(campaign.advertiser_id)?;
    let campaign = state
        .platform
        .campaigns
        .pause(id, actor(identity), &input.reason)?;
    Ok(Json(ApiResponse::success(campaign.into())))
}

/// Resume a paused campaign; retries any pending billing batch first
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{id}/resume",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Active campaign", body = CampaignView),
        (status = 409, description = "Not paused, or balance still short")
    ),
    tag = "campaigns",
    security(("bearer" = []))
)]
pub async fn resume_campaign(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CampaignView>>, ApiError> {
    let campaign = state.platform.campaigns.get(id)?;
    identity.authorize_owner(campaign.advertiser_id)?;
    let campaign = state.platform.campaigns.resume(id, actor(identity))?;
    Ok(Json(ApiResponse::success(campaign.into())))
}

/// Stop a campaign and settle it. Idempotent: stopping an already
/// settled campaign returns the stored settlement.
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{id}/stop",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    request_body = StopRequest,
    responses(
        (status = 200, description = "Settlement", body = SettlementView),
        (status = 409, description = "Not stoppable")
    ),
    tag = "campaigns",
    security(("bearer" = []))
)]
pub async fn stop_campaign(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(input): Json<StopRequest>,
) -> Result<Json<ApiResponse<SettlementView>>, ApiError> {
    let campaign = state.platform.campaigns.get(id)?;
    identity.authorize_owner(campaign.advertiser_id)?;
    let reason = input.reason.unwrap_or_else(|| "advertiser requested".into());
    let settlement = state
        .platform
        .campaigns
        .stop(id, actor(identity), &reason)?;
    Ok(Json(ApiResponse::success(settlement.into())))
}

/// Settlement for a stopped or completed campaign
#[utoipa::path(
    get,
    path = "/api/v1/campaigns/{id}/settlement",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Settlement", body = SettlementView),
        (status = 404, description = "No settlement yet")
    ),
    tag = "campaigns",
    security(("bearer" = []))
)]
pub async fn get_settlement(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SettlementView>>, ApiError> {
    let campaign = state.platform.campaigns.get(id)?;
    identity.authorize_owner(campaign.advertiser_id)?;
    let settlement = state.platform.campaigns.settlement(id)?;
    Ok(Json(ApiResponse::success(settlement.into())))
}
