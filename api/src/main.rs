//! AdMeter API - Main Entry Point

use std::sync::Arc;

use admeter_api::{build_router, ApiState};
use admeter_billing::BillingPlatform;
use admeter_common::BillingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("AdMeter API v{}", env!("CARGO_PKG_VERSION"));

    let config = BillingConfig::from_env();
    let jwt_secret = std::env::var("ADMETER_JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("ADMETER_JWT_SECRET not set, using development secret");
        "admeter-dev-secret".into()
    });

    let platform = Arc::new(BillingPlatform::new(config));
    let app = build_router(ApiState {
        platform,
        jwt_secret,
    });

    let addr = std::env::var("ADMETER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
