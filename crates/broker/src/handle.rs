use std::collections::{BTreeMap, BTreeSet, HashSet};

use infernet_primitives::{HardwareItem, NodeSpec};
use tokio::sync::{mpsc, oneshot};

use crate::{
    command::{BrokerCommand, EpochMlNodeInfo, LockedNode, PocStageContext, ReleaseOutcome},
    state::NodeView,
    BrokerError,
};

/// Handle to the broker actor. Cheap to clone; every call is one command on
/// the serial queue.
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    command_tx: mpsc::Sender<BrokerCommand>,
}

impl BrokerHandle {
    pub(crate) fn new(command_tx: mpsc::Sender<BrokerCommand>) -> Self {
        Self { command_tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> BrokerCommand,
    ) -> Result<T, BrokerError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(build(tx))
            .await
            .map_err(|_| BrokerError::Closed)?;
        rx.await.map_err(|_| BrokerError::Closed)
    }

    pub(crate) async fn send_raw(&self, command: BrokerCommand) {
        let _ = self.command_tx.send(command).await;
    }

    pub async fn register_node(&self, spec: NodeSpec) -> Result<NodeView, BrokerError> {
        self.request(|resp| BrokerCommand::RegisterNode { spec, resp })
            .await?
    }

    pub async fn update_node(&self, spec: NodeSpec) -> Result<NodeView, BrokerError> {
        self.request(|resp| BrokerCommand::UpdateNode { spec, resp })
            .await?
    }

    pub async fn remove_node(&self, id: &str) -> Result<bool, BrokerError> {
        let id = id.to_owned();
        self.request(|resp| BrokerCommand::RemoveNode { id, resp }).await
    }

    pub async fn set_admin_state(
        &self,
        id: &str,
        enabled: bool,
        epoch: u64,
    ) -> Result<bool, BrokerError> {
        let id = id.to_owned();
        self.request(|resp| BrokerCommand::SetNodeAdminState {
            id,
            enabled,
            epoch,
            resp,
        })
        .await
    }

    pub async fn update_hardware(
        &self,
        id: &str,
        hardware: Vec<HardwareItem>,
    ) -> Result<bool, BrokerError> {
        let id = id.to_owned();
        self.request(|resp| BrokerCommand::UpdateNodeHardware { id, hardware, resp })
            .await
    }

    /// Picks and locks a serving node for `model_id`, or `None` when no node
    /// qualifies right now.
    pub async fn lock_available_node(
        &self,
        model_id: &str,
        version: Option<String>,
        skip_ids: HashSet<String>,
    ) -> Result<Option<LockedNode>, BrokerError> {
        let model_id = model_id.to_owned();
        self.request(|resp| BrokerCommand::LockAvailableNode {
            model_id,
            version,
            skip_ids,
            resp,
        })
        .await
    }

    pub async fn release_node(&self, id: &str, outcome: ReleaseOutcome) {
        let id = id.to_owned();
        let _ = self
            .request(|resp| BrokerCommand::ReleaseNode { id, outcome, resp })
            .await;
    }

    pub async fn nodes(&self) -> Result<Vec<NodeView>, BrokerError> {
        self.request(|resp| BrokerCommand::GetNodes { resp }).await
    }

    pub async fn node_by_num(&self, node_num: u64) -> Result<Option<NodeView>, BrokerError> {
        self.request(|resp| BrokerCommand::GetNodeByNodeNum { node_num, resp })
            .await
    }

    pub async fn update_epoch_data(
        &self,
        epoch: u64,
        models: BTreeSet<String>,
        ml_nodes: BTreeMap<String, EpochMlNodeInfo>,
    ) {
        let _ = self
            .request(|resp| BrokerCommand::UpdateNodeWithEpochData {
                epoch,
                models,
                ml_nodes,
                resp,
            })
            .await;
    }

    pub async fn set_governance_models(&self, models: BTreeSet<String>) {
        self.send_raw(BrokerCommand::SetGovernanceModels { models })
            .await;
    }

    pub async fn check_version_health(
        &self,
        version: &str,
    ) -> Result<BTreeMap<String, bool>, BrokerError> {
        let version = version.to_owned();
        self.request(|resp| BrokerCommand::CheckVersionHealth { version, resp })
            .await
    }

    pub async fn start_poc(&self, block_height: u64, block_hash: String) {
        self.send_raw(BrokerCommand::StartPoc {
            ctx: PocStageContext {
                block_height,
                block_hash,
            },
        })
        .await;
    }

    pub async fn init_validate(&self, block_height: u64, block_hash: String) {
        self.send_raw(BrokerCommand::InitValidate {
            ctx: PocStageContext {
                block_height,
                block_hash,
            },
        })
        .await;
    }

    pub async fn inference_up_all(&self) {
        self.send_raw(BrokerCommand::InferenceUpAll).await;
    }

    pub async fn stop_all(&self) {
        self.send_raw(BrokerCommand::StopAll).await;
    }

    /// Asks the node's worker to re-query `/state`.
    pub async fn query_node_status(&self, id: &str) {
        self.send_raw(BrokerCommand::QueryNodeStatus { id: id.to_owned() })
            .await;
    }
}
