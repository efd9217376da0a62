use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use doc_chat::api;
use doc_chat::config::Config;
use doc_chat::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // LOG_LEVEL wins, then RUST_LOG, then "info".
    let filter = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env();
    tracing::info!("Docs directory: {}", config.docs_dir.display());
    tracing::info!("LLM endpoint: {} ({})", config.llm.base_url, config.llm.model);

    let state = AppState::new(config.clone())?;

    // Warm up in the background so the first chat request doesn't pay for
    // ingestion. The readiness gate in the handlers covers the window.
    {
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = state.ensure_ready().await {
                tracing::error!(error = %e, "startup initialization failed");
            }
        });
    }

    let app = Router::new()
        .route("/api/chat", post(api::chat::chat))
        .route("/api/chat/stream", post(api::chat::chat_stream))
        .route("/api/health", get(api::admin::health))
        .route("/api/ingest", post(api::admin::reingest))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr()).await?;
    tracing::info!("Server listening on {}", config.bind_addr());

    axum::serve(listener, app).await?;
    Ok(())
}
