mod config;
mod db;
mod errors;
mod fill;
mod llm_client;
mod notes;
mod prompts;
mod routes;
mod state;
mod template;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::{AnthropicBackend, CompletionBackend, EmulatedBackend};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting FieldFill API v{}", env!("CARGO_PKG_VERSION"));

    // Open the note collection
    let db = create_pool(&config.database_url).await?;

    // Pick the completion backend
    let llm: Arc<dyn CompletionBackend> = if config.emulate_completions {
        info!("Completion backend: emulated (no upstream calls)");
        Arc::new(EmulatedBackend)
    } else {
        let api_key = config
            .anthropic_api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("ANTHROPIC_API_KEY is not set"))?;
        info!("Completion backend: anthropic (model: {})", llm_client::MODEL);
        Arc::new(AnthropicBackend::new(api_key, config.llm_timeout))
    };

    // Shutdown token: fill runs hold child tokens, so in-flight completion
    // calls abort when the server stops
    let shutdown = CancellationToken::new();

    let state = AppState {
        db,
        llm,
        config: config.clone(),
        shutdown: shutdown.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS once the host origin is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

/// Resolves on ctrl-c and trips the shared token so in-flight fill runs
/// abort promptly.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
