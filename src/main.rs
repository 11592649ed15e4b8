//! Social Alert Relay — Binary Entrypoint
//! Boots the Axum HTTP server, wiring webhook routes, the alert hub, the
//! live WebSocket channel, and the Prometheus exporter.

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use social_alert_relay::api::{self, AppState};
use social_alert_relay::config::AppConfig;
use social_alert_relay::metrics::Metrics;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("social_alert_relay=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::from_env().context("load config")?;
    let port = config.port;

    let metrics = Metrics::init();
    let state = AppState::new(config);
    let app = api::create_router(state).merge(metrics.router());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    tracing::info!(%addr, "social alert relay listening");
    tracing::info!("webhooks: /webhooks/instagram, /webhooks/facebook, /webhooks/linkedin");
    tracing::info!("live channel: /ws | manual trigger: POST /api/trigger-alert");

    axum::serve(listener, app).await.context("serve")?;
    Ok(())
}
