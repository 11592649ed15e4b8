// tests/live_ws.rs
//
// Live channel over a real socket: spin the relay up on an ephemeral port,
// connect WebSocket clients, and check the connect-confirmation, history
// catch-up, push, and disconnect-pruning behavior.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

use social_alert_relay::api::{create_router, AppState};
use social_alert_relay::config::AppConfig;
use social_alert_relay::delivery::live::{LiveChannel, WsLiveChannel};
use social_alert_relay::hub::AlertDraft;
use social_alert_relay::live::LiveFrame;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_relay() -> (SocketAddr, AppState) {
    let state = AppState::new(AppConfig::default());
    let app = create_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve relay");
    });
    (addr, state)
}

async fn connect(addr: SocketAddr) -> WsStream {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect");
    ws
}

/// Next text frame as parsed JSON.
async fn next_frame(ws: &mut WsStream) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("parse frame");
        }
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn client_gets_confirmation_then_pushed_alerts() {
    let (addr, state) = spawn_relay().await;
    let mut ws = connect(addr).await;

    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["event"], "connected");
    assert_eq!(frame["data"]["message"], "Connected to social media alerts");

    wait_until(|| state.hub.connected_clients() == 1).await;
    state
        .hub
        .publish(AlertDraft::new("instagram", "fresh post", json!({"mediaId": "m1"})));

    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["event"], "new-post");
    assert_eq!(frame["data"]["platform"], "instagram");
    assert_eq!(frame["data"]["data"]["mediaId"], "m1");
}

#[tokio::test]
async fn reconnecting_client_gets_last_five_history_oldest_first() {
    let (addr, state) = spawn_relay().await;
    for i in 0..7 {
        state
            .hub
            .publish(AlertDraft::new(format!("p{i}"), "m", json!({})));
    }

    let mut ws = connect(addr).await;
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["event"], "connected");

    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["event"], "post-history");
    let alerts = frame["data"].as_array().expect("history array");
    assert_eq!(alerts.len(), 5);
    let platforms: Vec<&str> = alerts.iter().filter_map(|a| a["platform"].as_str()).collect();
    assert_eq!(platforms, vec!["p2", "p3", "p4", "p5", "p6"]);
}

#[tokio::test]
async fn disconnecting_client_is_removed_from_the_subscriber_set() {
    let (addr, state) = spawn_relay().await;
    let ws = connect(addr).await;
    wait_until(|| state.hub.connected_clients() == 1).await;

    drop(ws);
    wait_until(|| state.hub.connected_clients() == 0).await;

    // Publishing afterwards is harmless.
    state.hub.publish(AlertDraft::new("test", "m", json!({})));
    assert_eq!(state.hub.connected_clients(), 0);
}

#[tokio::test]
async fn ws_live_channel_yields_protocol_frames() {
    let (addr, state) = spawn_relay().await;

    let channel = WsLiveChannel::new(format!("ws://{addr}/ws"));
    let mut rx = channel.connect().await.expect("live channel connect");

    let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    assert!(matches!(frame, LiveFrame::Connected { .. }));

    wait_until(|| state.hub.connected_clients() == 1).await;
    state
        .hub
        .publish(AlertDraft::new("facebook", "hello", json!({"postId": "fb_1"})));

    let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    match frame {
        LiveFrame::NewPost(alert) => {
            assert_eq!(alert.platform, "facebook");
            assert_eq!(alert.data["postId"], "fb_1");
        }
        other => panic!("expected new-post frame, got {other:?}"),
    }
}
