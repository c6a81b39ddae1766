//! Serde models for the subset of the Tendermint RPC surface we consume.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::ChainError;

/// Condensed node status: tip height/time plus sync state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStatus {
    pub latest_block_height: u64,
    pub latest_block_time: DateTime<Utc>,
    pub catching_up: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusResponse {
    pub sync_info: SyncInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SyncInfo {
    pub latest_block_height: String,
    pub latest_block_time: DateTime<Utc>,
    pub catching_up: bool,
}

impl TryFrom<StatusResponse> for ChainStatus {
    type Error = ChainError;

    fn try_from(resp: StatusResponse) -> Result<Self, ChainError> {
        Ok(Self {
            latest_block_height: parse_height(&resp.sync_info.latest_block_height)?,
            latest_block_time: resp.sync_info.latest_block_time,
            catching_up: resp.sync_info.catching_up,
        })
    }
}

/// One ABCI event attached to a transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct AbciEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<AbciEventAttribute>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbciEventAttribute {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Execution result of one transaction within a block.
#[derive(Debug, Clone, Deserialize)]
pub struct TxResult {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub events: Vec<AbciEvent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlockResultsResponse {
    pub height: String,
    #[serde(default)]
    pub txs_results: Option<Vec<TxResult>>,
}

/// Per-block transaction results, as pulled by the block observer.
#[derive(Debug, Clone)]
pub struct BlockResults {
    pub height: u64,
    pub txs_results: Vec<TxResult>,
}

impl TryFrom<BlockResultsResponse> for BlockResults {
    type Error = ChainError;

    fn try_from(resp: BlockResultsResponse) -> Result<Self, ChainError> {
        Ok(Self {
            height: parse_height(&resp.height)?,
            txs_results: resp.txs_results.unwrap_or_default(),
        })
    }
}

/// Flattened event payload of one transaction, keyed as
/// `event_type.attribute_name` with all observed values in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxEventData {
    pub height: u64,
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl TxEventData {
    /// Flattens ABCI events into the dotted-key form and injects `tx.height`.
    pub fn from_events(height: u64, events: &[AbciEvent]) -> Self {
        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for event in events {
            for attr in &event.attributes {
                attributes
                    .entry(format!("{}.{}", event.kind, attr.key))
                    .or_default()
                    .push(attr.value.clone());
            }
        }
        attributes.insert("tx.height".to_owned(), vec![height.to_string()]);
        Self { height, attributes }
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn has_flag(&self, key: &str, expected: &str) -> bool {
        self.first(key) == Some(expected)
    }
}

pub(crate) fn parse_height(raw: &str) -> Result<u64, ChainError> {
    raw.parse()
        .map_err(|_| ChainError::decode(format!("bad height '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattening_injects_height_and_groups_values() {
        let events = vec![
            AbciEvent {
                kind: "inference_finished".to_owned(),
                attributes: vec![
                    AbciEventAttribute {
                        key: "inference_id".to_owned(),
                        value: "abc".to_owned(),
                    },
                    AbciEventAttribute {
                        key: "inference_id".to_owned(),
                        value: "def".to_owned(),
                    },
                ],
            },
            AbciEvent {
                kind: "message".to_owned(),
                attributes: vec![AbciEventAttribute {
                    key: "module".to_owned(),
                    value: "inference".to_owned(),
                }],
            },
        ];

        let data = TxEventData::from_events(17, &events);
        assert_eq!(data.first("tx.height"), Some("17"));
        assert_eq!(
            data.attributes.get("inference_finished.inference_id"),
            Some(&vec!["abc".to_owned(), "def".to_owned()])
        );
        assert!(data.has_flag("message.module", "inference"));
    }
}
