//! Batch handler behind the per-node PoC WebSocket clients.

use async_trait::async_trait;
use infernet_chain::ChainMsg;
use infernet_node_client::BatchHandler;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, warn};

/// Sink for PoC chain messages. The production impl is the tx outbox.
pub trait PocSubmitter: Send + Sync {
    fn submit(&self, msg: ChainMsg) -> Result<(), infernet_txmgr::TxError>;
}

impl PocSubmitter for infernet_txmgr::TxManager {
    fn submit(&self, msg: ChainMsg) -> Result<(), infernet_txmgr::TxError> {
        self.queue(msg)
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedBatch {
    #[serde(default)]
    batch_id: String,
    poc_stage_start_block_height: u64,
    #[serde(default)]
    nonces: Vec<i64>,
    #[serde(default)]
    dist: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct ValidatedBatch {
    poc_stage_start_block_height: u64,
    #[serde(default)]
    validated_participant: String,
    #[serde(default)]
    r_target: f64,
    #[serde(default)]
    fraud_threshold: f64,
    #[serde(default)]
    n_invalid: i64,
    #[serde(default)]
    probability_honest: f64,
    #[serde(default)]
    fraud_detected: bool,
}

/// Translates PoC WebSocket messages into chain submissions.
pub struct PocBatchHandler<S> {
    submitter: S,
}

impl<S: PocSubmitter> PocBatchHandler<S> {
    pub fn new(submitter: S) -> Self {
        Self { submitter }
    }
}

#[async_trait]
impl<S: PocSubmitter> BatchHandler for PocBatchHandler<S> {
    async fn on_generated(&self, node_id: String, batch: Value) {
        let parsed: GeneratedBatch = match serde_json::from_value(batch) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(%node_id, %err, "undecodable generated batch");
                return;
            }
        };
        let msg = ChainMsg::SubmitPocBatch {
            poc_stage_start_block_height: parsed.poc_stage_start_block_height,
            batch_id: parsed.batch_id,
            node_id,
            nonces: parsed.nonces,
            dist: parsed.dist,
        };
        if let Err(err) = self.submitter.submit(msg) {
            error!(%err, "cannot queue poc batch submission");
        }
    }

    async fn on_validated(&self, node_id: String, batch: Value) {
        let parsed: ValidatedBatch = match serde_json::from_value(batch) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(%node_id, %err, "undecodable validated batch");
                return;
            }
        };
        // The nonce and distribution arrays are emptied before broadcast to
        // keep the tx small; only `fraud_detected` is consumed on-chain
        // today. The fields stay in the wire type for when that changes.
        let msg = ChainMsg::SubmitPocValidation {
            poc_stage_start_block_height: parsed.poc_stage_start_block_height,
            validated_participant: parsed.validated_participant,
            nonces: Vec::new(),
            dist: Vec::new(),
            received_dist: Vec::new(),
            r_target: parsed.r_target,
            fraud_threshold: parsed.fraud_threshold,
            n_invalid: parsed.n_invalid,
            probability_honest: parsed.probability_honest,
            fraud_detected: parsed.fraud_detected,
        };
        if let Err(err) = self.submitter.submit(msg) {
            error!(%err, "cannot queue poc validation submission");
        }
    }
}
