mod config;
mod error;
mod metrics;
mod routes;
mod state;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, LogFormat};
use crate::state::AppState;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);

    tracing::info!(
        root = %config.workspace.root.display(),
        default_group = %config.workspace.default_group_id,
        llm_provider = config.providers.llm_provider.as_deref().unwrap_or(""),
        embedding_provider = config.providers.embedding_provider.as_deref().unwrap_or(""),
        "Starting graph RAG API"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config).await?;
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
