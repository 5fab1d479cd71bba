//! Main entry point for the AutoNote API gateway

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use autonote_gateway::{api, config::Settings, AppState};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .init();

    info!("starting AutoNote API gateway");

    // Load configuration
    let settings = Settings::load()?;
    settings.validate()?;
    let addr = format!("{}:{}", settings.host, settings.port);

    // Create application state
    let state = Arc::new(AppState::from_settings(settings)?);

    for (name, url) in state.registry.services() {
        info!(service = %name, url = %url, "registered service");
    }

    // Start background tasks
    state.prober.start().await;
    state.limiter.clone().start_eviction(Duration::from_secs(60));

    // Build the router
    let app = api::routes::create_router(state.clone());

    info!(addr = %addr, "gateway listening");

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
