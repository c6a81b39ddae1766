use std::time::Duration;

use infernet_primitives::NodeSpec;
use serde::{Deserialize, Serialize};

use crate::params::{BandwidthParams, ValidationParams};

/// Root of the YAML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    pub chain_node: ChainNodeConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub ml_node_key_config: MlNodeKeyConfig,
    #[serde(default)]
    pub validation_params: ValidationParams,
    #[serde(default)]
    pub bandwidth_params: BandwidthParams,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub enforced_model: Option<EnforcedModel>,
}

/// HTTP surface the control plane exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub public_listen_addr: String,
    pub admin_listen_addr: String,
    /// URL other participants use to reach this participant's public API.
    #[serde(default)]
    pub public_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            public_listen_addr: "0.0.0.0:9100".to_owned(),
            admin_listen_addr: "127.0.0.1:9200".to_owned(),
            public_url: String::new(),
        }
    }
}

/// Connection and signing info for the chain full node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainNodeConfig {
    pub rpc_url: String,
    pub ws_url: String,
    pub grpc_url: String,
    pub chain_id: String,
    /// Bech32 address of the participant (grantor) account.
    pub account_address: String,
    #[serde(default)]
    pub account_number: u64,
    /// Name of the API signer key in the keyring.
    pub signer_key_name: String,
    /// Bech32 address derived from the signer key. When it differs from
    /// `account_address`, submissions are wrapped in an authz exec.
    pub signer_address: String,
    #[serde(default)]
    pub keyring_backend: String,
    /// Directory holding the keyring; defaults to the home directory.
    #[serde(default)]
    pub keyring_dir: String,
    /// Seconds without a new block before the chain counts as halted.
    #[serde(default = "default_halt_timeout_secs")]
    pub halt_timeout_secs: u64,
}

fn default_halt_timeout_secs() -> u64 {
    120
}

impl ChainNodeConfig {
    pub fn halt_timeout(&self) -> Duration {
        Duration::from_secs(self.halt_timeout_secs)
    }

    pub fn uses_grantee_signer(&self) -> bool {
        !self.signer_address.is_empty() && self.signer_address != self.account_address
    }
}

/// Durable stream store used by the transaction outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub path: String,
    pub flush_size: usize,
    pub flush_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            path: "infernet-bus".to_owned(),
            flush_size: 50,
            flush_timeout_ms: 2_000,
        }
    }
}

impl BusConfig {
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

/// Bearer tokens the local ML-nodes accept, keyed by node id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MlNodeKeyConfig {
    #[serde(default)]
    pub keys: std::collections::BTreeMap<String, String>,
}

/// Per-phase reconciliation cadence. A cycle fires when either the block
/// count or the wall-clock interval has elapsed since the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    pub poc_blocks: u64,
    pub poc_secs: u64,
    pub inference_blocks: u64,
    pub inference_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            poc_blocks: 5,
            poc_secs: 30,
            inference_blocks: 10,
            inference_secs: 60,
        }
    }
}

/// Worker pool sizes for the event dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub tx_workers: usize,
    pub block_workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tx_workers: 4,
            block_workers: 1,
        }
    }
}

/// Process-wide model enforcement: every node serves this model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcedModel {
    pub model_id: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl EnforcedModel {
    /// The disable string turns enforcement into a no-op.
    pub const DISABLED: &'static str = "disabled";

    pub fn is_active(&self) -> bool {
        !self.model_id.is_empty() && self.model_id != Self::DISABLED
    }
}
