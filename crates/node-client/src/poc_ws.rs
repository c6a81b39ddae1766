//! Per-node PoC WebSocket client.
//!
//! Reads typed `generated`/`validated` messages, hands them to the batch
//! handler, and acknowledges each by id. Reconnects with a jittered backoff
//! until shut down.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{protocol::WebSocketConfig, Message},
};
use tracing::{debug, info, warn};

use crate::NodeClientError;

/// Largest PoC frame we accept.
const MAX_READ_BYTES: usize = 64 * 1024 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(60);
const ACK_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_BASE: Duration = Duration::from_secs(3);
const RECONNECT_JITTER_MS: u64 = 2_000;

/// One message from the node's PoC engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PocWsMessage {
    Generated { batch: Value, id: String },
    Validated { batch: Value, id: String },
}

impl PocWsMessage {
    pub fn id(&self) -> &str {
        match self {
            Self::Generated { id, .. } | Self::Validated { id, .. } => id,
        }
    }
}

#[derive(Debug, Serialize)]
struct Ack<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: &'a str,
}

/// Receives PoC batches and turns them into chain submissions.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn on_generated(&self, node_id: String, batch: Value);

    async fn on_validated(&self, node_id: String, batch: Value);
}

#[derive(Debug, Clone)]
pub struct PocWsConfig {
    pub node_id: String,
    /// HTTP root of the node's PoC API; scheme is rewritten to ws(s).
    pub poc_url: String,
}

impl PocWsConfig {
    fn ws_url(&self) -> String {
        let base = self
            .poc_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/api/v1/pow/ws", base.trim_end_matches('/'))
    }
}

/// Runs the client until `shutdown` flips to true.
pub async fn run_poc_ws_client<H: BatchHandler + ?Sized>(
    config: PocWsConfig,
    handler: std::sync::Arc<H>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        match serve_connection(&config, handler.as_ref(), &mut shutdown).await {
            Ok(()) => {
                info!(node_id = %config.node_id, "poc ws client stopped");
                return;
            }
            Err(err) => {
                warn!(node_id = %config.node_id, %err, "poc ws connection lost");
            }
        }

        let jitter = rand::thread_rng().gen_range(0..RECONNECT_JITTER_MS);
        let backoff = RECONNECT_BASE + Duration::from_millis(jitter);
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown.changed() => {}
        }
    }
}

/// One connection lifetime. `Ok(())` means a clean shutdown was requested.
async fn serve_connection<H: BatchHandler + ?Sized>(
    config: &PocWsConfig,
    handler: &H,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), NodeClientError> {
    let ws_config = WebSocketConfig::default()
        .max_message_size(Some(MAX_READ_BYTES))
        .max_frame_size(Some(MAX_READ_BYTES));
    let (mut ws, _) = connect_async_with_config(config.ws_url(), Some(ws_config), false).await?;
    debug!(node_id = %config.node_id, "poc ws connected");

    loop {
        let polled = tokio::select! {
            frame = tokio::time::timeout(READ_TIMEOUT, ws.next()) => Some(frame),
            _ = shutdown.changed() => None,
        };
        let Some(read) = polled else {
            if *shutdown.borrow() {
                let _ = ws.close(None).await;
                return Ok(());
            }
            continue;
        };
        let frame = read
            .map_err(|_| NodeClientError::Transport("poc ws read timeout".into()))?;

        let Some(frame) = frame else {
            return Err(NodeClientError::Transport("poc ws stream ended".into()));
        };

        match frame? {
            Message::Text(text) => {
                let message: PocWsMessage = match serde_json::from_str(text.as_str()) {
                    Ok(message) => message,
                    Err(err) => {
                        warn!(node_id = %config.node_id, %err, "undecodable poc ws message");
                        continue;
                    }
                };

                let id = message.id().to_owned();
                match message {
                    PocWsMessage::Generated { batch, .. } => {
                        handler.on_generated(config.node_id.clone(), batch).await;
                    }
                    PocWsMessage::Validated { batch, .. } => {
                        handler.on_validated(config.node_id.clone(), batch).await;
                    }
                }

                let ack = serde_json::to_string(&Ack { kind: "ack", id: &id })
                    .map_err(|e| NodeClientError::Decode(e.to_string()))?;
                let sent = tokio::time::timeout(ACK_TIMEOUT, ws.send(Message::Text(ack.into())))
                    .await
                    .map_err(|_| NodeClientError::Transport("poc ws ack timeout".into()))?;
                // A failed write means the peer is gone; close and reconnect.
                sent?;
            }
            Message::Ping(payload) => {
                ws.send(Message::Pong(payload)).await?;
            }
            Message::Close(_) => {
                return Err(NodeClientError::Transport("poc ws closed by peer".into()));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_rewrites_scheme_and_appends_path() {
        let config = PocWsConfig {
            node_id: "n1".into(),
            poc_url: "http://ml0:5000/".into(),
        };
        assert_eq!(config.ws_url(), "ws://ml0:5000/api/v1/pow/ws");

        let tls = PocWsConfig {
            node_id: "n1".into(),
            poc_url: "https://ml0".into(),
        };
        assert_eq!(tls.ws_url(), "wss://ml0/api/v1/pow/ws");
    }

    #[test]
    fn messages_decode_by_type_tag() {
        let raw = r#"{"type": "generated", "batch": {"nonces": [1, 2]}, "id": "b-1"}"#;
        let message: PocWsMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(message, PocWsMessage::Generated { .. }));
        assert_eq!(message.id(), "b-1");

        let raw = r#"{"type": "validated", "batch": {}, "id": "b-2"}"#;
        let message: PocWsMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(message, PocWsMessage::Validated { .. }));
    }
}
