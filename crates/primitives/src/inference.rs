use serde::{Deserialize, Serialize};

/// On-chain status of an inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InferenceStatus {
    Started,
    Finished,
    Validated,
    Invalidated,
    Expired,
}

/// Read model of an inference as recorded on chain.
///
/// `inference_id` is the base64 identifier assigned by the executor. The
/// payload fields are legacy carriers kept for older records; current
/// records serve payloads from the executor's HTTP API instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRecord {
    pub inference_id: String,
    pub prompt_hash: String,
    pub executor_id: String,
    pub model: String,
    #[serde(default)]
    pub node_version: String,
    pub epoch_id: u64,
    pub status: InferenceStatus,
    #[serde(default)]
    pub prompt_payload: Option<String>,
    #[serde(default)]
    pub response_payload: Option<String>,
    #[serde(default)]
    pub total_power: u64,
    #[serde(default)]
    pub executor_power: u64,
}
