//! Probe that connects a DeliveryStrategy to a running relay and prints every
//! event it delivers. Handy for end-to-end checks together with
//! `POST /api/trigger-alert`.

use std::sync::Arc;

use social_alert_relay::config::SnapshotConfig;
use social_alert_relay::delivery::live::WsLiveChannel;
use social_alert_relay::delivery::snapshot::CombinedSnapshot;
use social_alert_relay::{DeliveryConfig, DeliveryStrategy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let url = std::env::var("RELAY_WS_URL").unwrap_or_else(|_| "ws://127.0.0.1:5000/ws".into());

    let strategy = DeliveryStrategy::new(
        Arc::new(WsLiveChannel::new(url.clone())),
        Arc::new(CombinedSnapshot::from_env(&SnapshotConfig::from_env())),
        DeliveryConfig::from_env(),
    );

    let token = strategy.on_event(|ev| println!("event: {ev:?}"));
    strategy.start();
    println!("relay-probe watching {url} (ctrl-c to exit)");

    tokio::signal::ctrl_c().await?;

    strategy.remove_listener(token);
    strategy.stop();
    println!("relay-probe done");
    Ok(())
}
