//! Event tracking endpoints
//!
//! Called by ad-serving machine accounts at high volume. Tracking never
//! fails because of billing: a shortfall pauses the campaign and the event
//! call still succeeds.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::*;
use crate::ApiState;

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/:id/impression", post(track_impression))
        .route("/:id/click", post(track_click))
        .route("/:id/conversion", post(track_conversion))
}

/// Record an ad view; may trigger a billing batch
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{id}/impression",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    request_body = TrackRequest,
    responses(
        (status = 200, description = "Event outcome", body = TrackResult),
        (status = 400, description = "Campaign not active"),
        (status = 404, description = "Campaign not found")
    ),
    tag = "tracking",
    security(("bearer" = []))
)]
pub async fn track_impression(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<TrackRequest>,
) -> Result<Json<ApiResponse<TrackResult>>, ApiError> {
    let out = state.platform.meter.track_impression(
        id,
        input.placement,
        &input.fingerprint,
        input.metadata,
    )?;
    Ok(Json(ApiResponse::success(TrackResult {
        counted: out.counted,
        billed_batches: out.billed_batches,
        campaign_status: out.status.to_string(),
    })))
}

/// Record a click (counted, never billed)
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{id}/click",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    request_body = TrackRequest,
    responses(
        (status = 200, description = "Event outcome", body = TrackResult)
    ),
    tag = "tracking",
    security(("bearer" = []))
)]
pub async fn track_click(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<TrackRequest>,
) -> Result<Json<ApiResponse<TrackResult>>, ApiError> {
    let out = state
        .platform
        .meter
        .track_click(id, input.placement, &input.fingerprint, input.metadata)?;
    Ok(Json(ApiResponse::success(TrackResult {
        counted: out.counted,
        billed_batches: out.billed_batches,
        campaign_status: out.status.to_string(),
    })))
}

/// Record a conversion (counted, never billed)
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{id}/conversion",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    request_body = TrackRequest,
    responses(
        (status = 200, description = "Event outcome", body = TrackResult)
    ),
    tag = "tracking",
    security(("bearer" = []))
)]
pub async fn track_conversion(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<TrackRequest>,
) -> Result<Json<ApiResponse<TrackResult>>, ApiError> {
    let out = state
        .platform
        .meter
        .track_conversion(id, input.placement, &input.fingerprint, input.metadata)?;
    Ok(Json(ApiResponse::success(TrackResult {
        counted: out.counted,
        billed_batches: out.billed_batches,
        campaign_status: out.status.to_string(),
    })))
}
