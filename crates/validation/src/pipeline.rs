//! The validation flow: sample, fetch payloads, re-run, compare, report.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use base64::Engine as _;
use infernet_broker::{do_with_locked_node_retry, BrokerHandle, LockRetryError};
use infernet_chain::{ChainError, ChainQuery, Signer};
use infernet_config::ValidationParams;
use infernet_db::{kv, SeedSlot, Store};
use infernet_node_client::{ExecutorClient, MlNodeClient};
use infernet_phase_tracker::PhaseTracker;
use infernet_primitives::{InferenceRecord, SeedInfo};
use parking_lot::Mutex;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    compare_logits, extract_token_logprobs, should_validate, SamplingInfo, ValidationOutcome,
    ValidationReport,
};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("inference '{0}' not found on chain")]
    MissingInference(String),

    #[error("payload acquisition failed: {0}")]
    Payload(String),

    #[error("prompt hash mismatch for inference '{0}'")]
    PromptHashMismatch(String),

    #[error("undecodable payload: {0}")]
    Decode(String),

    #[error("no usable node: {0}")]
    Node(String),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Broker(#[from] infernet_broker::BrokerError),

    #[error(transparent)]
    Tx(#[from] infernet_txmgr::TxError),

    #[error("store: {0}")]
    Store(String),
}

impl From<infernet_db::DbError> for ValidationError {
    fn from(err: infernet_db::DbError) -> Self {
        Self::Store(err.to_string())
    }
}

/// Long-lived validation pipeline handle.
pub struct Validator {
    broker: BrokerHandle,
    query: Arc<dyn ChainQuery>,
    txmgr: infernet_txmgr::TxManager,
    executor_client: ExecutorClient,
    signer: Signer,
    store: Store,
    phase_tracker: Arc<PhaseTracker>,
    participant: String,
    defaults: ValidationParams,
    validator_power: Mutex<u64>,
}

impl Validator {
    #[expect(clippy::too_many_arguments, reason = "wired once at startup")]
    pub fn new(
        broker: BrokerHandle,
        query: Arc<dyn ChainQuery>,
        txmgr: infernet_txmgr::TxManager,
        executor_client: ExecutorClient,
        signer: Signer,
        store: Store,
        phase_tracker: Arc<PhaseTracker>,
        participant: String,
        defaults: ValidationParams,
    ) -> Self {
        Self {
            broker,
            query,
            txmgr,
            executor_client,
            signer,
            store,
            phase_tracker,
            participant,
            defaults,
            validator_power: Mutex::new(1),
        }
    }

    pub fn set_validator_power(&self, power: u64) {
        *self.validator_power.lock() = power.max(1);
    }

    pub fn validator_power(&self) -> u64 {
        *self.validator_power.lock()
    }

    pub fn participant(&self) -> &str {
        &self.participant
    }

    /// Chain-cached validation params, falling back to configured defaults.
    pub fn params(&self) -> ValidationParams {
        self.store
            .kv_get::<ValidationParams>(kv::VALIDATION_PARAMS)
            .ok()
            .flatten()
            .unwrap_or_else(|| self.defaults.clone())
    }

    fn current_seed(&self) -> Option<SeedInfo> {
        self.store.seed(SeedSlot::Current).ok().flatten()
    }

    /// Entry point for `inference_finished` events: sample, then validate.
    pub async fn maybe_validate(
        &self,
        inference_id: &str,
        revalidation: bool,
    ) -> Result<(), ValidationError> {
        let record = self
            .query
            .inference(inference_id.to_owned())
            .await?
            .ok_or_else(|| ValidationError::MissingInference(inference_id.to_owned()))?;

        if !revalidation {
            // Too close to the next PoC: reports can no longer land in this
            // epoch's tally.
            if let Some(epoch_state) = self.phase_tracker.epoch_state() {
                let height = epoch_state.current_block.height();
                if !epoch_state
                    .latest_epoch
                    .within_inference_validation_window(height)
                {
                    debug!(inference_id, height, "past inference validation cutoff");
                    return Ok(());
                }
            }

            let Some(seed) = self.current_seed() else {
                debug!(inference_id, "no current seed; skipping validation");
                return Ok(());
            };
            let params = self.params();
            let info = SamplingInfo {
                inference_id: record.inference_id.clone(),
                executor_id: record.executor_id.clone(),
                total_power: record.total_power,
                executor_power: record.executor_power,
            };
            let decision = should_validate(
                seed.seed,
                &info,
                self.validator_power(),
                &self.participant,
                &params,
            );
            if !decision.validate {
                debug!(inference_id, reason = %decision.reason, "skipping validation");
                return Ok(());
            }
            debug!(inference_id, reason = %decision.reason, "validating");
        }

        self.validate_record(record, revalidation).await
    }

    /// Validates a specific inference without the sampling gate. Used by the
    /// startup recovery sweep.
    pub async fn validate_inference_by_id(
        &self,
        inference_id: &str,
        revalidation: bool,
    ) -> Result<(), ValidationError> {
        let record = self
            .query
            .inference(inference_id.to_owned())
            .await?
            .ok_or_else(|| ValidationError::MissingInference(inference_id.to_owned()))?;
        self.validate_record(record, revalidation).await
    }

    async fn validate_record(
        &self,
        record: InferenceRecord,
        revalidation: bool,
    ) -> Result<(), ValidationError> {
        let report = self.run_validation(&record, revalidation).await?;
        let value = report.outcome.value();
        let msg = report.into_msg();

        match self.txmgr.send_transaction_async_with_retry(msg).await {
            Ok(_) => {}
            Err(infernet_txmgr::TxError::FailedQueuedForRetry) => {
                // Parked on the durable outbox; it will land eventually.
            }
            Err(err) => return Err(err.into()),
        }
        info!(
            inference_id = %record.inference_id,
            value,
            revalidation,
            "validation reported"
        );
        Ok(())
    }

    async fn run_validation(
        &self,
        record: &InferenceRecord,
        revalidation: bool,
    ) -> Result<ValidationReport, ValidationError> {
        let params = self.params();

        let nodes = self.broker.nodes().await?;
        if !nodes
            .iter()
            .any(|node| node.config.supports_model(&record.model))
        {
            debug!(model = %record.model, "no local node supports model");
            return Ok(ValidationReport::new(
                record.inference_id.clone(),
                String::new(),
                ValidationOutcome::ModelNotSupported,
                revalidation,
            ));
        }

        let (prompt_payload, original_response_raw) = self.fetch_payloads(record).await?;
        verify_prompt_hash(&record.inference_id, &record.prompt_hash, &prompt_payload)?;

        let original_response: Value = serde_json::from_str(&original_response_raw)
            .map_err(|e| ValidationError::Decode(format!("original response: {e}")))?;
        let original_logits = extract_token_logprobs(&original_response)
            .ok_or_else(|| ValidationError::Decode("original response has no logprobs".into()))?;

        let enforced = original_response
            .get("enforced_str")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let top_k = original_logits
            .iter()
            .map(|position| position.top.len())
            .max()
            .unwrap_or(1)
            .max(1);
        let request = patch_request(&prompt_payload, enforced.as_deref(), top_k)?;

        let version = Some(record.node_version.clone()).filter(|v| !v.is_empty());
        let locked_run = do_with_locked_node_retry(
            &self.broker,
            &record.model,
            version,
            params.max_lock_attempts,
            |node| {
                let request = request.clone();
                async move {
                    let client = MlNodeClient::new(&node.view.config)?;
                    client.chat_completions(&request).await
                }
            },
        )
        .await;

        let validator_response = match locked_run {
            Ok(response) => response,
            Err(LockRetryError::NoNodeAvailable { .. }) => {
                return Ok(ValidationReport::new(
                    record.inference_id.clone(),
                    String::new(),
                    ValidationOutcome::ModelNotSupported,
                    revalidation,
                ));
            }
            Err(err) => return Err(ValidationError::Node(err.to_string())),
        };

        let validator_logits = extract_token_logprobs(&validator_response)
            .ok_or_else(|| ValidationError::Decode("validator response has no logprobs".into()))?;
        let outcome = compare_logits(&original_logits, &validator_logits, params.epsilon);

        Ok(ValidationReport::new(
            record.inference_id.clone(),
            validator_response.to_string(),
            outcome,
            revalidation,
        ))
    }

    /// Preferred path: the executor's payload endpoint with signed headers.
    /// Fallback: the deprecated on-chain payload fields.
    async fn fetch_payloads(
        &self,
        record: &InferenceRecord,
    ) -> Result<(String, String), ValidationError> {
        match self.query.participant(record.executor_id.clone()).await {
            Ok(Some(executor)) if !executor.inference_url.is_empty() => {
                let timestamp = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|elapsed| elapsed.as_secs() as i64)
                    .unwrap_or_default();
                match self
                    .executor_client
                    .inference_payloads(
                        &executor.inference_url,
                        &record.inference_id,
                        &self.signer,
                        timestamp,
                    )
                    .await
                {
                    Ok(payloads) => {
                        return Ok((payloads.prompt_payload, payloads.response_payload));
                    }
                    Err(err) => {
                        warn!(
                            inference_id = %record.inference_id,
                            %err,
                            "executor payload fetch failed; falling back to chain"
                        );
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!(executor = %record.executor_id, %err, "executor lookup failed");
            }
        }

        let prompt = record
            .prompt_payload
            .clone()
            .filter(|payload| !payload.is_empty());
        let response = record
            .response_payload
            .clone()
            .filter(|payload| !payload.is_empty());
        match (prompt, response) {
            (Some(prompt), Some(response)) => Ok((prompt, response)),
            _ => Err(ValidationError::Payload(format!(
                "no payload source for inference '{}'",
                record.inference_id
            ))),
        }
    }
}

/// Checks the fetched prompt against the on-chain commitment. An empty
/// commitment skips the check (old records).
fn verify_prompt_hash(
    inference_id: &str,
    expected: &str,
    prompt_payload: &str,
) -> Result<(), ValidationError> {
    if expected.is_empty() {
        return Ok(());
    }
    let digest = Sha256::digest(prompt_payload.as_bytes());
    let hex_hash = hex::encode(digest);
    let b64_hash = base64::engine::general_purpose::STANDARD.encode(digest);
    if expected.eq_ignore_ascii_case(&hex_hash) || expected == b64_hash {
        Ok(())
    } else {
        Err(ValidationError::PromptHashMismatch(inference_id.to_owned()))
    }
}

/// Rebuilds the original request for the deterministic re-run.
fn patch_request(
    prompt_payload: &str,
    enforced: Option<&str>,
    top_k: usize,
) -> Result<Value, ValidationError> {
    let mut request: Value = serde_json::from_str(prompt_payload)
        .map_err(|e| ValidationError::Decode(format!("prompt payload: {e}")))?;
    request["stream"] = json!(false);
    request["logprobs"] = json!(true);
    request["top_logprobs"] = json!(top_k);
    if let Some(enforced) = enforced {
        request["enforced_str"] = json!(enforced);
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_hash_accepts_hex_and_base64() {
        let payload = r#"{"messages": []}"#;
        let digest = Sha256::digest(payload.as_bytes());

        verify_prompt_hash("i", &hex::encode(digest), payload).unwrap();
        verify_prompt_hash(
            "i",
            &base64::engine::general_purpose::STANDARD.encode(digest),
            payload,
        )
        .unwrap();
        verify_prompt_hash("i", "", payload).unwrap();

        assert!(matches!(
            verify_prompt_hash("i", "deadbeef", payload),
            Err(ValidationError::PromptHashMismatch(_))
        ));
    }

    #[test]
    fn patched_request_disables_streaming() {
        let request = patch_request(
            r#"{"model": "llama-3", "stream": true, "messages": []}"#,
            Some("det-v1"),
            5,
        )
        .unwrap();

        assert_eq!(request["stream"], json!(false));
        assert_eq!(request["logprobs"], json!(true));
        assert_eq!(request["top_logprobs"], json!(5));
        assert_eq!(request["enforced_str"], json!("det-v1"));
        assert_eq!(request["model"], json!("llama-3"));
    }

    #[test]
    fn malformed_prompt_payload_is_a_decode_error() {
        assert!(matches!(
            patch_request("not-json", None, 1),
            Err(ValidationError::Decode(_))
        ));
    }
}
