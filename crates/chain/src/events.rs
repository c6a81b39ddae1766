//! WebSocket subscription to the chain's event stream.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use crate::{types::parse_height, ChainError, TxEventData};

/// The four standing subscriptions the control plane keeps open.
pub const SUBSCRIPTION_QUERIES: [&str; 4] = [
    "tm.event='NewBlock'",
    "tm.event='Tx' AND message.module='inference'",
    "tm.event='Tx' AND message.module='bls'",
    "tm.event='Tx' AND message.action='/cosmos.authz.v1beta1.MsgExec'",
];

/// One event delivered over the subscription socket.
#[derive(Debug, Clone)]
pub enum ChainWsEvent {
    NewBlock {
        height: u64,
        hash: String,
        time: Option<DateTime<Utc>>,
    },
    Tx(TxEventData),
}

/// A live subscription socket. Reconnecting is the caller's concern.
#[derive(Debug)]
pub struct EventSocket {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl EventSocket {
    /// Connects and registers every query in `queries`.
    pub async fn connect(url: &str, queries: &[&str]) -> Result<Self, ChainError> {
        let (mut ws, _) = connect_async(url).await?;
        for (id, query) in queries.iter().enumerate() {
            let frame = json!({
                "jsonrpc": "2.0",
                "method": "subscribe",
                "id": id + 1,
                "params": { "query": query },
            });
            ws.send(Message::Text(frame.to_string().into())).await?;
        }
        debug!(url, subscriptions = queries.len(), "event socket connected");
        Ok(Self { ws })
    }

    /// Reads until a decodable event arrives. `Ok(None)` means the peer
    /// closed the stream.
    pub async fn next_event(&mut self) -> Result<Option<ChainWsEvent>, ChainError> {
        loop {
            let Some(frame) = self.ws.next().await else {
                return Ok(None);
            };
            match frame? {
                Message::Text(text) => {
                    if let Some(event) = parse_event_frame(text.as_str()) {
                        return Ok(Some(event));
                    }
                }
                Message::Ping(payload) => {
                    self.ws.send(Message::Pong(payload)).await?;
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
    }

    pub async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}

#[derive(Debug, Deserialize)]
struct WsFrame {
    #[serde(default)]
    result: Option<WsResult>,
}

#[derive(Debug, Deserialize)]
struct WsResult {
    #[serde(default)]
    data: Option<WsData>,
    #[serde(default)]
    events: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Deserialize)]
struct WsData {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: serde_json::Value,
}

/// Decodes one text frame. Subscribe confirmations and unknown event kinds
/// yield `None`.
fn parse_event_frame(text: &str) -> Option<ChainWsEvent> {
    let frame: WsFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(%err, "undecodable ws frame");
            return None;
        }
    };
    let result = frame.result?;
    let data = result.data?;

    if data.kind.ends_with("NewBlock") {
        let header = &data.value["block"]["header"];
        let height = parse_height(header["height"].as_str()?).ok()?;
        let hash = data.value["block_id"]["hash"]
            .as_str()
            .unwrap_or_default()
            .to_owned();
        let time = header["time"]
            .as_str()
            .and_then(|raw| raw.parse::<DateTime<Utc>>().ok());
        return Some(ChainWsEvent::NewBlock { height, hash, time });
    }

    if data.kind.ends_with("Tx") {
        let attributes = result.events?;
        let height = attributes
            .get("tx.height")
            .and_then(|values| values.first())
            .and_then(|raw| raw.parse().ok())?;
        return Some(ChainWsEvent::Tx(TxEventData { height, attributes }));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_new_block_frame() {
        let frame = r#"{
            "jsonrpc": "2.0", "id": 1,
            "result": {
                "query": "tm.event='NewBlock'",
                "data": {
                    "type": "tendermint/event/NewBlock",
                    "value": {
                        "block": {"header": {"height": "1200", "time": "2026-01-02T03:04:05Z"}},
                        "block_id": {"hash": "ABCD"}
                    }
                }
            }
        }"#;
        match parse_event_frame(frame) {
            Some(ChainWsEvent::NewBlock { height, hash, time }) => {
                assert_eq!(height, 1200);
                assert_eq!(hash, "ABCD");
                assert!(time.is_some());
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parses_tx_frame_with_events_map() {
        let frame = r#"{
            "jsonrpc": "2.0", "id": 2,
            "result": {
                "query": "tm.event='Tx'",
                "data": {"type": "tendermint/event/Tx", "value": {}},
                "events": {
                    "tx.height": ["55"],
                    "inference_finished.inference_id": ["abc"]
                }
            }
        }"#;
        match parse_event_frame(frame) {
            Some(ChainWsEvent::Tx(data)) => {
                assert_eq!(data.height, 55);
                assert_eq!(data.first("inference_finished.inference_id"), Some("abc"));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn subscribe_confirmation_is_skipped() {
        let frame = r#"{"jsonrpc": "2.0", "id": 1, "result": {}}"#;
        assert!(parse_event_frame(frame).is_none());
    }
}
