//! Per-node worker: owns the node's HTTP client and drives transitions.

use infernet_node_client::{InferenceUpRequest, MlNodeClient, PocInitRequest};
use infernet_primitives::{NodeStatus, PocStatus};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::command::{BrokerCommand, WorkerFailure};

/// One unit of work for a node worker.
#[derive(Debug)]
pub(crate) enum WorkerJob {
    /// Drive the node toward the given intent and report the outcome.
    Apply {
        intent: NodeIntent,
        generation: u64,
    },
    /// Query `/state` and report what the node says.
    QueryStatus { generation: u64 },
    /// Probe `/inference/health` for version compatibility.
    HealthProbe { generation: u64 },
}

/// Everything a worker needs to enact one transition, captured at dispatch
/// time so the worker never reads shared state.
#[derive(Debug, Clone)]
pub(crate) struct NodeIntent {
    pub target: NodeStatus,
    pub poc_target: PocStatus,
    /// Model and args for inference bring-up.
    pub model: Option<(String, Vec<String>)>,
    /// PoC init body for generate/validate bring-up.
    pub poc_init: Option<PocInitRequest>,
}

pub(crate) async fn node_worker(
    node_id: String,
    client: MlNodeClient,
    mut jobs: mpsc::Receiver<WorkerJob>,
    broker_tx: mpsc::Sender<BrokerCommand>,
) {
    while let Some(job) = jobs.recv().await {
        let report = match job {
            WorkerJob::Apply { intent, generation } => apply(&node_id, &client, intent, generation).await,
            WorkerJob::QueryStatus { generation } => query_status(&client, generation).await,
            WorkerJob::HealthProbe { generation } => health_probe(&client, generation).await,
        };
        if broker_tx.send(report.into_command(node_id.clone())).await.is_err() {
            return;
        }
    }
    debug!(%node_id, "node worker drained");
}

struct Report {
    generation: u64,
    current_status: Option<NodeStatus>,
    poc_current_status: Option<PocStatus>,
    version: Option<String>,
    failure: Option<WorkerFailure>,
}

impl Report {
    fn into_command(self, id: String) -> BrokerCommand {
        BrokerCommand::WorkerReport {
            id,
            generation: self.generation,
            current_status: self.current_status,
            poc_current_status: self.poc_current_status,
            version: self.version,
            failure: self.failure,
        }
    }
}

async fn apply(node_id: &str, client: &MlNodeClient, intent: NodeIntent, generation: u64) -> Report {
    let result = match intent.target {
        NodeStatus::Poc => match (&intent.poc_init, intent.poc_target) {
            (Some(init), PocStatus::Generating) => client.init_generate(init).await,
            (Some(init), PocStatus::Validating) => client.init_validate(init).await,
            _ => Ok(()),
        },
        NodeStatus::Inference => match &intent.model {
            Some((model, args)) => {
                client
                    .inference_up(&InferenceUpRequest {
                        model: model.clone(),
                        args: args.clone(),
                    })
                    .await
            }
            None => Ok(()),
        },
        NodeStatus::Stopped => client.set_state("STOPPED").await,
        _ => Ok(()),
    };

    match result {
        Ok(()) => Report {
            generation,
            current_status: Some(intent.target),
            poc_current_status: Some(intent.poc_target),
            version: None,
            failure: None,
        },
        Err(err) => {
            warn!(node_id, target = ?intent.target, %err, "node transition failed");
            Report {
                generation,
                current_status: Some(NodeStatus::Failed),
                poc_current_status: None,
                version: None,
                failure: Some(WorkerFailure {
                    attempted: intent.target,
                    error: err.to_string(),
                }),
            }
        }
    }
}

async fn query_status(client: &MlNodeClient, generation: u64) -> Report {
    match client.state().await {
        Ok(state) => {
            let status = match state.state.as_str() {
                "POW" | "POC" => NodeStatus::Poc,
                "INFERENCE" => NodeStatus::Inference,
                "STOPPED" => NodeStatus::Stopped,
                "TRAINING" => NodeStatus::Training,
                _ => NodeStatus::Unknown,
            };
            let poc = state.pow_status.as_deref().map(|raw| match raw {
                "GENERATING" => PocStatus::Generating,
                "VALIDATING" => PocStatus::Validating,
                _ => PocStatus::Idle,
            });
            Report {
                generation,
                current_status: Some(status),
                poc_current_status: poc,
                version: state.version,
                failure: None,
            }
        }
        Err(err) => Report {
            generation,
            current_status: Some(NodeStatus::Unknown),
            poc_current_status: None,
            version: None,
            failure: Some(WorkerFailure {
                attempted: NodeStatus::Unknown,
                error: err.to_string(),
            }),
        },
    }
}

async fn health_probe(client: &MlNodeClient, generation: u64) -> Report {
    let healthy = client.inference_health().await.unwrap_or(false);
    Report {
        generation,
        current_status: healthy.then_some(NodeStatus::Inference),
        poc_current_status: None,
        version: None,
        failure: (!healthy).then(|| WorkerFailure {
            attempted: NodeStatus::Inference,
            error: "health probe failed".to_owned(),
        }),
    }
}
