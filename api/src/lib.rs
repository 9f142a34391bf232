//! AdMeter Billing API
//!
//! REST surface over the billing core: balance ledger, campaign
//! lifecycle, event tracking, settlements.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         ADMETER API                             │
//! │                                                                 │
//! │  ┌──────────────────────────────────────────────────────────┐  │
//! │  │                        REST API                           │  │
//! │  │       OpenAPI 3.1 | Bearer Auth (JWT) | Swagger UI        │  │
//! │  └──────────────────────────────────────────────────────────┘  │
//! │                                                                 │
//! │  ┌─────────────┐  ┌──────────────┐  ┌───────────────────────┐  │
//! │  │   Balance   │  │  Campaigns   │  │       Tracking        │  │
//! │  │  /balance   │  │  /campaigns  │  │ /campaigns/:id/events │  │
//! │  └─────────────┘  └──────────────┘  └───────────────────────┘  │
//! │                                                                 │
//! │  ┌──────────────────────────────────────────────────────────┐  │
//! │  │                admeter-billing (core engine)              │  │
//! │  └──────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod middleware;
pub mod models;
pub mod routes;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use admeter_billing::BillingPlatform;

pub use models::*;

/// API state
pub struct ApiState {
    /// Billing engine shared by every handler
    pub platform: Arc<BillingPlatform>,
    /// HMAC secret for bearer-token verification
    pub jwt_secret: String,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "AdMeter Billing API",
        version = "1.0.0",
        description = "Campaign billing: balance ledger, impression metering, lifecycle, settlements",
        license(name = "Apache-2.0")
    ),
    paths(
        routes::health::health_check,
        routes::balance::get_balance,
        routes::balance::deposit,
        routes::balance::list_transactions,
        routes::campaigns::list_campaigns,
        routes::campaigns::create_campaign,
        routes::campaigns::get_campaign,
        routes::campaigns::verify_campaign,
        routes::campaigns::launch_campaign,
        routes::campaigns::pause_campaign,
        routes::campaigns::resume_campaign,
        routes::campaigns::stop_campaign,
        routes::campaigns::get_settlement,
        routes::tracking::track_impression,
        routes::tracking::track_click,
        routes::tracking::track_conversion,
    ),
    components(
        schemas(
            ErrorResponse,
            DepositRequest, ReceiptView, BalanceView, TransactionView,
            RateCardBody, CampaignCreate, CampaignView,
            PauseRequest, StopRequest, SettlementView,
            TrackRequest, TrackResult,
            routes::health::HealthResponse
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "balance", description = "Advertiser balance and transactions"),
        (name = "campaigns", description = "Campaign lifecycle and settlements"),
        (name = "tracking", description = "Impression, click and conversion events")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Build the API router
pub fn build_router(state: ApiState) -> Router {
    let state = Arc::new(state);

    let api = Router::new()
        .nest("/balance", routes::balance::router())
        .nest(
            "/campaigns",
            routes::campaigns::router().merge(routes::tracking::router()),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(routes::health::health_check))
        .nest("/api/v1", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
