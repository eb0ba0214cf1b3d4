//! Main Entrypoint for the Parley API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the upstream clients for realtime sessions and vision.
//! 3. Constructing the Axum router.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use parley_api::{
    analysis::AnalysisStore,
    config::Config,
    router::create_router,
    state::AppState,
    upstream::{OpenAiSessions, OpenAiVision},
};
use secrecy::ExposeSecret;
use std::{net::SocketAddr, sync::Arc};
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Upstream Clients ---
    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let sessions = OpenAiSessions::new(
        http,
        &config.openai_base_url,
        config.openai_api_key.clone(),
        config.realtime_model.clone(),
        config.realtime_voice.clone(),
    );

    let openai_config = OpenAIConfig::new()
        .with_api_key(config.openai_api_key.expose_secret())
        .with_api_base(&config.openai_base_url);
    let analyzer = OpenAiVision::new(openai_config, config.vision_model.clone());

    let bind_address = config.bind_address;
    info!(
        realtime_model = %config.realtime_model,
        voice = %config.realtime_voice,
        vision_model = %config.vision_model,
        static_dir = %config.static_dir.display(),
        %bind_address,
        "Service configured. Starting server..."
    );

    let app_state = Arc::new(AppState {
        sessions: Arc::new(sessions),
        analyzer: Arc::new(analyzer),
        analyses: Arc::new(AnalysisStore::new(config.analysis_capacity)),
        config: Arc::new(config),
    });

    // --- 4. Create Router ---
    let app = create_router(app_state);

    // --- 5. Start Server ---
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
