use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use reqtail::app::{app, AppState};
use reqtail::config::{self, AppConfig};
use reqtail::observability::{logger, JsonLinesSink, LogSink, TracingSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up LOG_* and JWT_SECRET
    let _ = dotenvy::dotenv();

    // Initialize configuration (this loads the config singleton)
    let config = config::config();
    logger::init_tracing(&config.logging).context("failed to install tracing subscriber")?;
    tracing::info!(
        environment = ?config.environment,
        sample_rate = config.sampling.sample_rate,
        keep_all = config.sampling.keep_all,
        "Starting reqtail"
    );
    if reqtail::is_development!() {
        tracing::info!("Development mode: request records carry human-readable summaries");
    }

    let router = app(AppState::from_config(config, request_sink(config)));

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

/// JSON mode writes request records to stdout as nested objects; text mode
/// routes them through the subscriber with flattened fields.
fn request_sink(config: &AppConfig) -> Arc<dyn LogSink> {
    if config.logging.json {
        Arc::new(JsonLinesSink::new(std::io::stdout, config.logging.level))
    } else {
        Arc::new(TracingSink)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
