use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    future::Future,
    sync::Arc,
};

use chrono::Utc;
use infernet_config::EnforcedModel;
use infernet_db::Store;
use infernet_node_client::{BatchHandler, MlNodeClient, PocInitRequest, PocWsConfig};
use infernet_primitives::{InferenceNodeConfig, ModelConfig, NodeStatus, PocStatus};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::{
    command::{BrokerCommand, LockedNode, PocStageContext, ReleaseOutcome, WorkerFailure},
    state::{NodeState, NodeView, ReconcileInfo},
    worker::{node_worker, NodeIntent, WorkerJob},
    BrokerError, BrokerHandle,
};

const WORKER_QUEUE: usize = 16;

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Bound of the serial command queue.
    pub command_buffer: usize,
    /// Participant public key handed to nodes on PoC init.
    pub participant_pubkey: String,
    /// URL nodes call back with PoC batches.
    pub poc_callback_url: String,
    pub enforced_model: Option<EnforcedModel>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            command_buffer: 256,
            participant_pubkey: String::new(),
            poc_callback_url: String::new(),
            enforced_model: None,
        }
    }
}

/// Builds the broker: a handle plus the actor future to spawn.
///
/// Nodes already persisted in the store are respawned when the actor task
/// starts.
pub fn build_broker(
    store: Store,
    config: BrokerConfig,
    batch_handler: Arc<dyn BatchHandler>,
) -> (BrokerHandle, impl Future<Output = ()>) {
    let (command_tx, command_rx) = mpsc::channel(config.command_buffer);
    let handle = BrokerHandle::new(command_tx.clone());
    let task = broker_task(store, config, batch_handler, command_tx, command_rx);
    (handle, task)
}

async fn broker_task(
    store: Store,
    config: BrokerConfig,
    batch_handler: Arc<dyn BatchHandler>,
    command_tx: mpsc::Sender<BrokerCommand>,
    mut command_rx: mpsc::Receiver<BrokerCommand>,
) {
    let mut actor = BrokerActor {
        nodes: HashMap::new(),
        next_node_num: 1,
        governance_models: BTreeSet::new(),
        store,
        config,
        batch_handler,
        command_tx,
    };

    match actor.store.load_nodes() {
        Ok(existing) => {
            for node_config in existing {
                let node_num = actor.next_node_num;
                actor.next_node_num += 1;
                actor.spawn_entry(node_config, node_num);
            }
            info!(nodes = actor.nodes.len(), "broker restored persisted nodes");
        }
        Err(err) => error!(%err, "cannot restore nodes from store"),
    }

    while let Some(command) = command_rx.recv().await {
        actor.handle(command);
    }

    // Drain workers and PoC sockets on shutdown.
    for (_, entry) in actor.nodes.drain() {
        let _ = entry.poc_shutdown.send(true);
    }
    info!("broker actor stopped");
}

struct NodeEntry {
    config: InferenceNodeConfig,
    state: NodeState,
    node_num: u64,
    jobs: mpsc::Sender<WorkerJob>,
    poc_shutdown: watch::Sender<bool>,
    /// Transition deferred while the node is locked for inference.
    pending_intent: Option<NodeIntent>,
}

impl NodeEntry {
    fn view(&self) -> NodeView {
        NodeView {
            config: self.config.clone(),
            state: self.state.clone(),
            node_num: self.node_num,
        }
    }
}

struct BrokerActor {
    nodes: HashMap<String, NodeEntry>,
    next_node_num: u64,
    governance_models: BTreeSet<String>,
    store: Store,
    config: BrokerConfig,
    batch_handler: Arc<dyn BatchHandler>,
    command_tx: mpsc::Sender<BrokerCommand>,
}

impl BrokerActor {
    fn handle(&mut self, command: BrokerCommand) {
        match command {
            BrokerCommand::RegisterNode { spec, resp } => {
                let _ = resp.send(self.register(spec));
            }
            BrokerCommand::UpdateNode { spec, resp } => {
                let _ = resp.send(self.update(spec));
            }
            BrokerCommand::RemoveNode { id, resp } => {
                let _ = resp.send(self.remove(&id));
            }
            BrokerCommand::SetNodeAdminState {
                id,
                enabled,
                epoch,
                resp,
            } => {
                let known = self.with_node(&id, |entry| {
                    entry.state.admin_enabled = enabled;
                    entry.state.admin_epoch = epoch;
                });
                let _ = resp.send(known);
            }
            BrokerCommand::UpdateNodeHardware { id, hardware, resp } => {
                let updated = match self.nodes.get_mut(&id) {
                    Some(entry) => {
                        entry.config.hardware = hardware;
                        if let Err(err) = self.store.upsert_node(&entry.config) {
                            error!(node_id = %id, %err, "cannot persist hardware update");
                        }
                        true
                    }
                    None => false,
                };
                let _ = resp.send(updated);
            }
            BrokerCommand::LockAvailableNode {
                model_id,
                version,
                skip_ids,
                resp,
            } => {
                let _ = resp.send(self.lock_available(&model_id, version.as_deref(), &skip_ids));
            }
            BrokerCommand::ReleaseNode { id, outcome, resp } => {
                self.release(&id, outcome);
                let _ = resp.send(());
            }
            BrokerCommand::GetNodes { resp } => {
                let mut views: Vec<NodeView> = self.nodes.values().map(NodeEntry::view).collect();
                views.sort_by_key(|view| view.node_num);
                let _ = resp.send(views);
            }
            BrokerCommand::GetNodeByNodeNum { node_num, resp } => {
                let view = self
                    .nodes
                    .values()
                    .find(|entry| entry.node_num == node_num)
                    .map(NodeEntry::view);
                let _ = resp.send(view);
            }
            BrokerCommand::UpdateNodeWithEpochData {
                epoch,
                models,
                ml_nodes,
                resp,
            } => {
                for entry in self.nodes.values_mut() {
                    entry.state.epoch_models = models.clone();
                    entry.state.epoch_ml_nodes = ml_nodes.clone();
                    entry.state.admin_epoch = epoch;
                }
                let _ = resp.send(());
            }
            BrokerCommand::SetGovernanceModels { models } => {
                self.governance_models = models;
            }
            BrokerCommand::CheckVersionHealth { version, resp } => {
                let mut health = BTreeMap::new();
                for (id, entry) in &self.nodes {
                    let compatible = entry
                        .state
                        .version
                        .as_deref()
                        .map(|node_version| node_version == version)
                        .unwrap_or(true)
                        && entry.state.current_status != NodeStatus::Failed;
                    health.insert(id.clone(), compatible);
                }
                // refresh in the background for the next caller
                for entry in self.nodes.values_mut() {
                    entry.state.status_generation += 1;
                    let job = WorkerJob::HealthProbe {
                        generation: entry.state.status_generation,
                    };
                    if entry.jobs.try_send(job).is_err() {
                        warn!("worker queue full; skipping health probe");
                    }
                }
                let _ = resp.send(health);
            }
            BrokerCommand::StartPoc { ctx } => {
                self.reconcile_all(NodeStatus::Poc, PocStatus::Generating, Some(&ctx));
            }
            BrokerCommand::InitValidate { ctx } => {
                self.reconcile_all(NodeStatus::Poc, PocStatus::Validating, Some(&ctx));
            }
            BrokerCommand::InferenceUpAll => {
                self.reconcile_all(NodeStatus::Inference, PocStatus::Idle, None);
            }
            BrokerCommand::StopAll => {
                self.reconcile_all(NodeStatus::Stopped, PocStatus::Idle, None);
            }
            BrokerCommand::QueryNodeStatus { id } => {
                if let Some(entry) = self.nodes.get_mut(&id) {
                    entry.state.status_generation += 1;
                    let job = WorkerJob::QueryStatus {
                        generation: entry.state.status_generation,
                    };
                    if entry.jobs.try_send(job).is_err() {
                        warn!(node_id = %id, "worker queue full; status query dropped");
                    }
                }
            }
            BrokerCommand::WorkerReport {
                id,
                generation,
                current_status,
                poc_current_status,
                version,
                failure,
            } => {
                self.apply_report(&id, generation, current_status, poc_current_status, version, failure);
            }
        }
    }

    fn with_node(&mut self, id: &str, f: impl FnOnce(&mut NodeEntry)) -> bool {
        match self.nodes.get_mut(id) {
            Some(entry) => {
                f(entry);
                true
            }
            None => false,
        }
    }

    fn validate_models(&self, config: &InferenceNodeConfig) -> Result<(), BrokerError> {
        if self.governance_models.is_empty() {
            // Governance list not fetched yet; accept and let epoch data
            // correct it.
            return Ok(());
        }
        for model in config.models.keys() {
            if !self.governance_models.contains(model) {
                return Err(BrokerError::ModelNotGoverned {
                    model: model.clone(),
                });
            }
        }
        Ok(())
    }

    /// Applies the process-wide enforced model, preserving the node's own
    /// args when it already lists the model.
    fn apply_enforced_model(&self, config: &mut InferenceNodeConfig) {
        let Some(enforced) = self.config.enforced_model.as_ref().filter(|e| e.is_active()) else {
            return;
        };
        if !config.models.contains_key(&enforced.model_id) {
            config.models = BTreeMap::from([(
                enforced.model_id.clone(),
                ModelConfig {
                    args: enforced.args.clone(),
                },
            )]);
        }
    }

    fn register(&mut self, spec: infernet_primitives::NodeSpec) -> Result<NodeView, BrokerError> {
        let mut config = spec.into_config()?;
        if self.nodes.contains_key(&config.id) {
            return Err(BrokerError::DuplicateNode(config.id));
        }
        self.apply_enforced_model(&mut config);
        self.validate_models(&config)?;
        self.store.upsert_node(&config)?;

        let node_num = self.next_node_num;
        self.next_node_num += 1;
        let id = config.id.clone();
        self.spawn_entry(config, node_num);
        self.query_status(&id);

        self.nodes
            .get(&id)
            .map(NodeEntry::view)
            .ok_or_else(|| BrokerError::Store(format!("node '{id}' failed to start")))
    }

    fn update(&mut self, spec: infernet_primitives::NodeSpec) -> Result<NodeView, BrokerError> {
        let mut config = spec.into_config()?;
        let Some(existing) = self.nodes.get(&config.id) else {
            return Err(BrokerError::UnknownNode(config.id));
        };
        self.apply_enforced_model(&mut config);
        self.validate_models(&config)?;
        self.store.upsert_node(&config)?;

        let node_num = existing.node_num;
        let state = existing.state.clone();
        let id = config.id.clone();

        // The address may have changed: respawn the worker and PoC socket
        // against the new config, carrying the runtime state over.
        self.teardown_entry(&id);
        self.spawn_entry(config, node_num);
        if let Some(entry) = self.nodes.get_mut(&id) {
            entry.state = state;
        }
        self.query_status(&id);

        self.nodes
            .get(&id)
            .map(NodeEntry::view)
            .ok_or_else(|| BrokerError::Store(format!("node '{id}' failed to restart")))
    }

    fn remove(&mut self, id: &str) -> bool {
        if !self.nodes.contains_key(id) {
            return false;
        }
        self.teardown_entry(id);
        if let Err(err) = self.store.delete_node(id) {
            error!(node_id = id, %err, "cannot delete node from store");
        }
        true
    }

    fn teardown_entry(&mut self, id: &str) {
        if let Some(entry) = self.nodes.remove(id) {
            // Dropping the job sender drains the worker; the PoC socket gets
            // an explicit stop.
            let _ = entry.poc_shutdown.send(true);
        }
    }

    fn spawn_entry(&mut self, config: InferenceNodeConfig, node_num: u64) {
        let client = match MlNodeClient::new(&config) {
            Ok(client) => client,
            Err(err) => {
                error!(node_id = %config.id, %err, "cannot build node client");
                return;
            }
        };

        let (jobs_tx, jobs_rx) = mpsc::channel(WORKER_QUEUE);
        let (poc_shutdown_tx, poc_shutdown_rx) = watch::channel(false);

        tokio::spawn(node_worker(
            config.id.clone(),
            client,
            jobs_rx,
            self.command_tx.clone(),
        ));
        tokio::spawn(infernet_node_client::run_poc_ws_client(
            PocWsConfig {
                node_id: config.id.clone(),
                poc_url: config.address.poc_url(),
            },
            self.batch_handler.clone(),
            poc_shutdown_rx,
        ));

        debug!(node_id = %config.id, node_num, "node worker spawned");
        self.nodes.insert(
            config.id.clone(),
            NodeEntry {
                config,
                state: NodeState::new(),
                node_num,
                jobs: jobs_tx,
                poc_shutdown: poc_shutdown_tx,
                pending_intent: None,
            },
        );
    }

    fn query_status(&mut self, id: &str) {
        if let Some(entry) = self.nodes.get_mut(id) {
            entry.state.status_generation += 1;
            let job = WorkerJob::QueryStatus {
                generation: entry.state.status_generation,
            };
            let _ = entry.jobs.try_send(job);
        }
    }

    fn lock_available(
        &mut self,
        model_id: &str,
        version: Option<&str>,
        skip_ids: &std::collections::HashSet<String>,
    ) -> Option<LockedNode> {
        let candidate = self
            .nodes
            .values_mut()
            .filter(|entry| !skip_ids.contains(&entry.config.id))
            .filter(|entry| entry.state.is_lockable(entry.config.max_concurrent))
            .filter(|entry| entry.config.supports_model(model_id))
            .filter(|entry| match (version, entry.state.version.as_deref()) {
                (Some(wanted), Some(actual)) => wanted == actual,
                _ => true,
            })
            .min_by_key(|entry| entry.state.lock_count)?;

        candidate.state.lock_count += 1;
        Some(LockedNode {
            view: candidate.view(),
        })
    }

    fn release(&mut self, id: &str, outcome: ReleaseOutcome) {
        let Some(entry) = self.nodes.get_mut(id) else {
            return;
        };
        entry.state.lock_count = entry.state.lock_count.saturating_sub(1);

        match outcome {
            ReleaseOutcome::Success => {}
            ReleaseOutcome::TransportError => {
                self.query_status(id);
            }
            ReleaseOutcome::Fatal => {
                entry.state.current_status = NodeStatus::Failed;
                entry.state.failure_reason = "fatal inference outcome".to_owned();
                entry.state.status_timestamp = Utc::now();
            }
        }

        // Enact any transition that was held back by the lock.
        if let Some(entry) = self.nodes.get_mut(id) {
            if entry.state.lock_count == 0 {
                if let Some(intent) = entry.pending_intent.take() {
                    dispatch_intent(entry, intent);
                }
            }
        }
    }

    fn reconcile_all(
        &mut self,
        target: NodeStatus,
        poc_target: PocStatus,
        ctx: Option<&PocStageContext>,
    ) {
        let total_nodes = self.nodes.len() as u64;
        let pubkey = self.config.participant_pubkey.clone();
        let callback = self.config.poc_callback_url.clone();
        let enforced = self.config.enforced_model.clone();

        for entry in self.nodes.values_mut() {
            if !entry.state.admin_enabled {
                continue;
            }

            entry.state.intended_status = target;
            entry.state.poc_intended_status = poc_target;

            let poc_init = ctx.map(|ctx| PocInitRequest {
                block_height: ctx.block_height,
                block_hash: ctx.block_hash.clone(),
                public_key: pubkey.clone(),
                node_num: entry.node_num,
                total_nodes,
                url: callback.clone(),
            });
            let model = inference_model(&entry.config, enforced.as_ref());
            let intent = NodeIntent {
                target,
                poc_target,
                model,
                poc_init,
            };

            // A locked node keeps serving; the transition waits for release.
            if entry.state.lock_count > 0 && target != NodeStatus::Inference {
                entry.pending_intent = Some(intent);
            } else {
                dispatch_intent(entry, intent);
            }
        }
    }

    fn apply_report(
        &mut self,
        id: &str,
        generation: u64,
        current_status: Option<NodeStatus>,
        poc_current_status: Option<PocStatus>,
        version: Option<String>,
        failure: Option<WorkerFailure>,
    ) {
        let Some(entry) = self.nodes.get_mut(id) else {
            return;
        };
        // A newer query supersedes in-flight reports; drop the stale one.
        if generation < entry.state.status_generation {
            debug!(node_id = id, generation, "stale worker report");
            return;
        }
        entry.state.status_generation = generation;

        if let Some(status) = current_status {
            entry.state.current_status = status;
        }
        if let Some(poc) = poc_current_status {
            entry.state.poc_current_status = poc;
        }
        if version.is_some() {
            entry.state.version = version;
        }
        entry.state.status_timestamp = Utc::now();

        match failure {
            Some(failure) => {
                entry.state.failure_reason = failure.error.clone();
                entry.state.reconcile_info = Some(ReconcileInfo {
                    attempted: failure.attempted,
                    error: failure.error,
                    at: Utc::now(),
                });
            }
            None => {
                entry.state.failure_reason.clear();
            }
        }
    }
}

fn dispatch_intent(entry: &mut NodeEntry, intent: NodeIntent) {
    let job = WorkerJob::Apply {
        intent,
        generation: entry.state.status_generation,
    };
    if entry.jobs.try_send(job).is_err() {
        warn!(node_id = %entry.config.id, "worker queue full; transition dropped");
    }
}

/// Model/args a node should serve, honoring the enforced-model option.
fn inference_model(
    config: &InferenceNodeConfig,
    enforced: Option<&EnforcedModel>,
) -> Option<(String, Vec<String>)> {
    if let Some(enforced) = enforced.filter(|e| e.is_active()) {
        let args = config
            .models
            .get(&enforced.model_id)
            .map(|model| model.args.clone())
            .unwrap_or_else(|| enforced.args.clone());
        return Some((enforced.model_id.clone(), args));
    }
    config
        .models
        .iter()
        .next()
        .map(|(model, cfg)| (model.clone(), cfg.args.clone()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use infernet_node_client::MockBatchHandler;
    use infernet_primitives::NodeSpec;

    use super::*;
    use crate::command::EpochMlNodeInfo;

    fn spec(id: &str) -> NodeSpec {
        NodeSpec {
            id: id.to_owned(),
            base_url: Some("http://10.255.255.1:81".to_owned()),
            models: BTreeMap::from([
                ("llama-3".to_owned(), ModelConfig { args: vec!["--tp".into()] }),
            ]),
            max_concurrent: 2,
            ..Default::default()
        }
    }

    fn start_broker() -> BrokerHandle {
        start_broker_with(BrokerConfig::default())
    }

    fn start_broker_with(config: BrokerConfig) -> BrokerHandle {
        let store = Store::open_in_memory().unwrap();
        let (handle, task) = build_broker(store, config, Arc::new(MockBatchHandler::new()));
        tokio::spawn(task);
        handle
    }

    async fn mark_inference(handle: &BrokerHandle, id: &str) {
        handle
            .send_raw(BrokerCommand::WorkerReport {
                id: id.to_owned(),
                generation: 1_000,
                current_status: Some(NodeStatus::Inference),
                poc_current_status: Some(PocStatus::Idle),
                version: Some("1.2.0".to_owned()),
                failure: None,
            })
            .await;
    }

    #[tokio::test]
    async fn register_assigns_monotonic_node_nums() {
        let handle = start_broker();
        let first = handle.register_node(spec("a")).await.unwrap();
        let second = handle.register_node(spec("b")).await.unwrap();
        assert_eq!(first.node_num, 1);
        assert_eq!(second.node_num, 2);
    }

    #[tokio::test]
    async fn duplicate_register_is_rejected() {
        let handle = start_broker();
        handle.register_node(spec("a")).await.unwrap();
        let err = handle.register_node(spec("a")).await.unwrap_err();
        assert!(matches!(err, BrokerError::DuplicateNode(_)));
    }

    #[tokio::test]
    async fn update_preserves_node_num_and_state() {
        let handle = start_broker();
        let registered = handle.register_node(spec("a")).await.unwrap();
        mark_inference(&handle, "a").await;

        let updated = handle.update_node(spec("a")).await.unwrap();
        assert_eq!(updated.node_num, registered.node_num);
        assert_eq!(updated.state.current_status, NodeStatus::Inference);
        assert_eq!(updated.config, registered.config);
    }

    #[tokio::test]
    async fn update_unknown_node_fails() {
        let handle = start_broker();
        let err = handle.update_node(spec("ghost")).await.unwrap_err();
        assert!(matches!(err, BrokerError::UnknownNode(_)));
    }

    #[tokio::test]
    async fn remove_reports_unknown_ids() {
        let handle = start_broker();
        handle.register_node(spec("a")).await.unwrap();
        assert!(handle.remove_node("a").await.unwrap());
        assert!(!handle.remove_node("a").await.unwrap());
    }

    #[tokio::test]
    async fn governance_list_rejects_unknown_models() {
        let handle = start_broker();
        handle
            .set_governance_models(BTreeSet::from(["qwen".to_owned()]))
            .await;
        let err = handle.register_node(spec("a")).await.unwrap_err();
        assert!(matches!(err, BrokerError::ModelNotGoverned { .. }));
    }

    #[tokio::test]
    async fn lock_respects_capacity_and_skip() {
        let handle = start_broker();
        handle.register_node(spec("a")).await.unwrap();
        mark_inference(&handle, "a").await;

        let skip = HashSet::new();
        let first = handle
            .lock_available_node("llama-3", None, skip.clone())
            .await
            .unwrap();
        assert!(first.is_some());
        let second = handle
            .lock_available_node("llama-3", None, skip.clone())
            .await
            .unwrap();
        assert!(second.is_some());
        // max_concurrent = 2
        let third = handle
            .lock_available_node("llama-3", None, skip.clone())
            .await
            .unwrap();
        assert!(third.is_none());

        handle.release_node("a", ReleaseOutcome::Success).await;
        let again = handle.lock_available_node("llama-3", None, skip).await.unwrap();
        assert!(again.is_some());

        let skipped = handle
            .lock_available_node("llama-3", None, HashSet::from(["a".to_owned()]))
            .await
            .unwrap();
        assert!(skipped.is_none());
    }

    #[tokio::test]
    async fn lock_requires_matching_version() {
        let handle = start_broker();
        handle.register_node(spec("a")).await.unwrap();
        mark_inference(&handle, "a").await;

        let miss = handle
            .lock_available_node("llama-3", Some("9.9.9".to_owned()), HashSet::new())
            .await
            .unwrap();
        assert!(miss.is_none());

        let hit = handle
            .lock_available_node("llama-3", Some("1.2.0".to_owned()), HashSet::new())
            .await
            .unwrap();
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn fatal_release_marks_node_failed() {
        let handle = start_broker();
        handle.register_node(spec("a")).await.unwrap();
        mark_inference(&handle, "a").await;

        handle
            .lock_available_node("llama-3", None, HashSet::new())
            .await
            .unwrap()
            .unwrap();
        handle.release_node("a", ReleaseOutcome::Fatal).await;

        let nodes = handle.nodes().await.unwrap();
        assert_eq!(nodes[0].state.current_status, NodeStatus::Failed);
        assert_eq!(nodes[0].state.lock_count, 0);
    }

    #[tokio::test]
    async fn stop_all_defers_while_locked() {
        let handle = start_broker();
        handle.register_node(spec("a")).await.unwrap();
        mark_inference(&handle, "a").await;

        handle
            .lock_available_node("llama-3", None, HashSet::new())
            .await
            .unwrap()
            .unwrap();
        handle.stop_all().await;

        let view = &handle.nodes().await.unwrap()[0];
        assert_eq!(view.state.intended_status, NodeStatus::Stopped);
        // still serving while locked
        assert_eq!(view.state.current_status, NodeStatus::Inference);
        assert_eq!(view.state.lock_count, 1);
    }

    #[tokio::test]
    async fn epoch_data_lands_on_every_node() {
        let handle = start_broker();
        handle.register_node(spec("a")).await.unwrap();

        handle
            .update_epoch_data(
                7,
                BTreeSet::from(["llama-3".to_owned()]),
                BTreeMap::from([("a".to_owned(), EpochMlNodeInfo::default())]),
            )
            .await;

        let view = &handle.nodes().await.unwrap()[0];
        assert_eq!(view.state.admin_epoch, 7);
        assert!(view.state.epoch_models.contains("llama-3"));
    }

    #[tokio::test]
    async fn enforced_model_replaces_unlisted_models() {
        let config = BrokerConfig {
            enforced_model: Some(EnforcedModel {
                model_id: "qwen-72b".to_owned(),
                args: vec!["--quant".to_owned()],
            }),
            ..Default::default()
        };
        let handle = start_broker_with(config);
        let view = handle.register_node(spec("a")).await.unwrap();

        assert!(view.config.models.contains_key("qwen-72b"));
        assert!(!view.config.models.contains_key("llama-3"));
    }

    #[tokio::test]
    async fn disabled_enforcement_is_a_no_op() {
        let config = BrokerConfig {
            enforced_model: Some(EnforcedModel {
                model_id: EnforcedModel::DISABLED.to_owned(),
                args: vec![],
            }),
            ..Default::default()
        };
        let handle = start_broker_with(config);
        let view = handle.register_node(spec("a")).await.unwrap();
        assert!(view.config.models.contains_key("llama-3"));
    }
}
