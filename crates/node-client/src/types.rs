//! Request/response bodies of the ML-node HTTP surface.

use serde::{Deserialize, Serialize};

/// Body for `/poc/init-generate` and `/poc/init-validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PocInitRequest {
    pub block_height: u64,
    pub block_hash: String,
    pub public_key: String,
    #[serde(default)]
    pub node_num: u64,
    #[serde(default)]
    pub total_nodes: u64,
    pub url: String,
}

/// Body for `/inference/up`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceUpRequest {
    pub model: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// `GET /state` answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStateResponse {
    pub state: String,
    #[serde(default)]
    pub pow_status: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// `GET /pow/status` answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowStatusResponse {
    pub status: String,
    #[serde(default)]
    pub is_validating: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuDevice {
    pub name: String,
    #[serde(default)]
    pub memory_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskInfo {
    pub total_bytes: u64,
    pub free_bytes: u64,
}
