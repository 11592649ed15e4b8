//! Live channel seam. The trait keeps the strategy testable with fakes; the
//! production implementation speaks the relay's WebSocket protocol.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::live::LiveFrame;

#[async_trait]
pub trait LiveChannel: Send + Sync {
    /// Establish the push connection. The returned receiver yields frames
    /// until the connection is lost, then closes.
    async fn connect(&self) -> Result<mpsc::UnboundedReceiver<LiveFrame>>;
}

/// WebSocket client for the relay's `/ws` endpoint.
pub struct WsLiveChannel {
    url: String,
}

impl WsLiveChannel {
    /// `url` is the full ws endpoint, e.g. `ws://localhost:5000/ws`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl LiveChannel for WsLiveChannel {
    async fn connect(&self) -> Result<mpsc::UnboundedReceiver<LiveFrame>> {
        let (ws, _) = tokio_tungstenite::connect_async(&self.url)
            .await
            .context("live channel connect")?;
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (_, mut stream) = ws.split();
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<LiveFrame>(&text) {
                        Ok(frame) => {
                            if tx.send(frame).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            tracing::debug!(error = %err, "unrecognized live frame");
                        }
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            // Dropping `tx` closes the receiver; the strategy falls back.
        });

        Ok(rx)
    }
}
