use std::collections::{BTreeMap, BTreeSet, HashSet};

use infernet_primitives::{HardwareItem, NodeSpec, NodeStatus, PocStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::{state::NodeView, BrokerError};

/// Chain-side info about an ML-node active this epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochMlNodeInfo {
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub poc_weight: u64,
}

/// What a successful lock hands to the caller.
#[derive(Debug, Clone)]
pub struct LockedNode {
    pub view: NodeView,
}

/// How a borrowed node is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Success,
    /// Transport-level failure: triggers a status re-query.
    TransportError,
    /// Unrecoverable node fault: marks the node FAILED.
    Fatal,
}

/// Block context passed along with PoC stage triggers.
#[derive(Debug, Clone)]
pub struct PocStageContext {
    pub block_height: u64,
    pub block_hash: String,
}

/// The broker's serial command set. One queue, one consumer.
pub(crate) enum BrokerCommand {
    RegisterNode {
        spec: NodeSpec,
        resp: oneshot::Sender<Result<NodeView, BrokerError>>,
    },
    UpdateNode {
        spec: NodeSpec,
        resp: oneshot::Sender<Result<NodeView, BrokerError>>,
    },
    RemoveNode {
        id: String,
        resp: oneshot::Sender<bool>,
    },
    SetNodeAdminState {
        id: String,
        enabled: bool,
        epoch: u64,
        resp: oneshot::Sender<bool>,
    },
    UpdateNodeHardware {
        id: String,
        hardware: Vec<HardwareItem>,
        resp: oneshot::Sender<bool>,
    },
    LockAvailableNode {
        model_id: String,
        version: Option<String>,
        skip_ids: HashSet<String>,
        resp: oneshot::Sender<Option<LockedNode>>,
    },
    ReleaseNode {
        id: String,
        outcome: ReleaseOutcome,
        resp: oneshot::Sender<()>,
    },
    GetNodes {
        resp: oneshot::Sender<Vec<NodeView>>,
    },
    GetNodeByNodeNum {
        node_num: u64,
        resp: oneshot::Sender<Option<NodeView>>,
    },
    UpdateNodeWithEpochData {
        epoch: u64,
        models: BTreeSet<String>,
        ml_nodes: BTreeMap<String, EpochMlNodeInfo>,
        resp: oneshot::Sender<()>,
    },
    SetGovernanceModels {
        models: BTreeSet<String>,
    },
    CheckVersionHealth {
        version: String,
        resp: oneshot::Sender<BTreeMap<String, bool>>,
    },
    /// Reconciliation triggers; each nudges every eligible worker.
    StartPoc {
        ctx: PocStageContext,
    },
    InitValidate {
        ctx: PocStageContext,
    },
    InferenceUpAll,
    StopAll,
    /// Dispatch a status re-query for one node.
    QueryNodeStatus {
        id: String,
    },
    /// Upcall from a worker with what it observed on the node.
    WorkerReport {
        id: String,
        generation: u64,
        current_status: Option<NodeStatus>,
        poc_current_status: Option<PocStatus>,
        version: Option<String>,
        failure: Option<WorkerFailure>,
    },
}

/// Failure context reported by a worker after a reconcile attempt.
#[derive(Debug, Clone)]
pub(crate) struct WorkerFailure {
    pub attempted: NodeStatus,
    pub error: String,
}
