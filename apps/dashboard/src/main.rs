mod candidates;
mod config;
mod dashboard;
mod errors;
mod models;
mod notifications;
mod routes;
mod service_client;
mod state;
mod tracking;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::routes::build_router;
use crate::service_client::HttpAnalysisClient;
use crate::state::AppState;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting dashboard v{}", env!("CARGO_PKG_VERSION"));

    // Initialize analysis service client
    let client = HttpAnalysisClient::new(
        &config.analysis_api_url,
        config.analysis_api_token.clone(),
        config.http_timeout,
    )?;
    info!("Analysis service client initialized ({})", config.analysis_api_url);

    // Build the engine and start its pollers
    let dashboard = Dashboard::new(Arc::new(client), config.dashboard_options());
    dashboard.start();
    info!(
        "Polling job status every {:?}, notifications every {:?}",
        config.status_poll_interval, config.notification_poll_interval
    );

    let state = AppState {
        dashboard: Arc::clone(&dashboard),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the UI host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    dashboard.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
