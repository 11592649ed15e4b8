//! live.rs — the WebSocket live channel.
//!
//! On connect the server sends a `connected` confirmation frame, then a
//! `post-history` catch-up frame when history is non-empty, then a
//! `new-post` frame for every publish until the client goes away.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::hub::{Alert, HubEvent};

/// Wire frames of the live channel. The `event` names are what browser
/// clients subscribe to, so they stay kebab-case on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum LiveFrame {
    Connected {
        message: String,
        timestamp: DateTime<Utc>,
    },
    PostHistory(Vec<Alert>),
    NewPost(Alert),
}

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (handle, mut events) = state.hub.subscribe();
    let (mut sink, mut stream) = socket.split();

    let confirm = LiveFrame::Connected {
        message: "Connected to social media alerts".to_string(),
        timestamp: Utc::now(),
    };
    if send_frame(&mut sink, &confirm).await.is_err() {
        state.hub.unsubscribe(handle);
        return;
    }
    tracing::info!(subscriber = handle.id(), "live client connected");

    loop {
        tokio::select! {
            ev = events.recv() => {
                let Some(ev) = ev else { break };
                let frame = match ev {
                    HubEvent::History(alerts) => LiveFrame::PostHistory(alerts),
                    HubEvent::Alert(alert) => LiveFrame::NewPost(alert),
                };
                if send_frame(&mut sink, &frame).await.is_err() {
                    break;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Ping/pong is handled by axum; client payloads are ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.hub.unsubscribe(handle);
    tracing::info!(subscriber = handle.id(), "live client disconnected");
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: &LiveFrame,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).map_err(axum::Error::new)?;
    sink.send(Message::Text(text.into())).await
}
