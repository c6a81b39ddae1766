use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use infernet_primitives::{InferenceNodeConfig, NodeStatus, PocStatus};
use serde::{Deserialize, Serialize};

use crate::command::EpochMlNodeInfo;

/// Context of the last failed reconciliation attempt for a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileInfo {
    pub attempted: NodeStatus,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Mutable runtime state of one ML-node. Owned solely by the broker task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub intended_status: NodeStatus,
    pub current_status: NodeStatus,
    pub poc_intended_status: PocStatus,
    pub poc_current_status: PocStatus,
    pub lock_count: u32,
    pub admin_enabled: bool,
    pub admin_epoch: u64,
    pub failure_reason: String,
    pub status_timestamp: DateTime<Utc>,
    pub reconcile_info: Option<ReconcileInfo>,
    /// Models the chain considers active for this node this epoch.
    pub epoch_models: BTreeSet<String>,
    /// Chain-side view of active ML-nodes this epoch.
    pub epoch_ml_nodes: BTreeMap<String, EpochMlNodeInfo>,
    /// Node software version, as last reported by the node itself.
    pub version: Option<String>,
    /// Bumped whenever a status re-query is dispatched; lets lock-retry
    /// callers tell whether a requery landed after their attempt.
    pub status_generation: u64,
}

impl NodeState {
    pub(crate) fn new() -> Self {
        Self {
            intended_status: NodeStatus::Unknown,
            current_status: NodeStatus::Unknown,
            poc_intended_status: PocStatus::Idle,
            poc_current_status: PocStatus::Idle,
            lock_count: 0,
            admin_enabled: true,
            admin_epoch: 0,
            failure_reason: String::new(),
            status_timestamp: Utc::now(),
            reconcile_info: None,
            epoch_models: BTreeSet::new(),
            epoch_ml_nodes: BTreeMap::new(),
            version: None,
            status_generation: 0,
        }
    }

    pub fn is_lockable(&self, max_concurrent: u32) -> bool {
        self.admin_enabled
            && self.current_status == NodeStatus::Inference
            && self.lock_count < max_concurrent
    }
}

/// Consistent snapshot of one node, as returned by broker reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub config: InferenceNodeConfig,
    pub state: NodeState,
    pub node_num: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lockability_requires_inference_and_capacity() {
        let mut state = NodeState::new();
        assert!(!state.is_lockable(2));

        state.current_status = NodeStatus::Inference;
        assert!(state.is_lockable(2));

        state.lock_count = 2;
        assert!(!state.is_lockable(2));

        state.lock_count = 0;
        state.admin_enabled = false;
        assert!(!state.is_lockable(2));
    }
}
