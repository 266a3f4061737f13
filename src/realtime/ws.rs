//! WebSocket implementation of the realtime channel.
//!
//! Connects to the hosted change feed, sends a subscribe frame for the
//! user, and forwards JSON-encoded events until the server closes the
//! connection. Reconnection policy lives in the listener, not here: a
//! fresh `subscribe` call opens a fresh connection.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{RealtimeChannel, RealtimeEvent};
use crate::error::PlanError;

#[derive(Serialize)]
struct SubscribeFrame<'a> {
    action: &'static str,
    user_id: &'a str,
}

pub struct WsChannel {
    server_url: String,
    api_key: String,
}

impl WsChannel {
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Builds the WebSocket URL, converting http(s) schemes to ws(s).
    fn build_ws_url(&self) -> String {
        let base_url = if self.server_url.starts_with("http://") {
            self.server_url.replace("http://", "ws://")
        } else if self.server_url.starts_with("https://") {
            self.server_url.replace("https://", "wss://")
        } else if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            format!("ws://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!(
            "{}/changes?key={}",
            base_url.trim_end_matches('/'),
            self.api_key
        )
    }
}

#[async_trait]
impl RealtimeChannel for WsChannel {
    async fn subscribe(
        &self,
        user_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<RealtimeEvent>, PlanError> {
        let ws_url = self.build_ws_url();
        let (ws_stream, _) = connect_async(&ws_url)
            .await
            .map_err(|e| PlanError::Channel(e.to_string()))?;

        let (mut sender, mut receiver) = ws_stream.split();

        let frame = SubscribeFrame {
            action: "subscribe",
            user_id,
        };
        let encoded =
            serde_json::to_string(&frame).map_err(|e| PlanError::Channel(e.to_string()))?;
        sender
            .send(Message::Text(encoded.into()))
            .await
            .map_err(|e| PlanError::Channel(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(msg_result) = receiver.next().await {
                match msg_result {
                    Ok(Message::Text(data)) => match serde_json::from_str::<RealtimeEvent>(&data) {
                        Ok(event) => {
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "unparseable realtime frame, skipping");
                        }
                    },
                    Ok(Message::Binary(data)) => {
                        match serde_json::from_slice::<RealtimeEvent>(&data) {
                            Ok(event) => {
                                if tx.send(event).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "unparseable realtime frame, skipping");
                            }
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::debug!("realtime server closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "realtime websocket error");
                        break;
                    }
                }
            }
            // Dropping tx ends the listener's pump, which is the signal
            // to re-subscribe.
        });

        Ok(rx)
    }
}
