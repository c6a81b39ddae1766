//! Domain-level union of the messages this participant submits on-chain.
//!
//! A [`ChainMsg`] is what flows through the transaction outbox; encoding to
//! the wire happens at broadcast time so a re-broadcast can carry a fresh
//! timeout timestamp.

use infernet_primitives::HardwareItem;
use serde::{Deserialize, Serialize};

use crate::proto;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainMsg {
    SubmitSeed {
        epoch_index: u64,
        signature: String,
    },
    ClaimRewards {
        seed: i64,
        epoch_index: u64,
    },
    Validation {
        id: String,
        inference_id: String,
        response_payload: String,
        response_hash: String,
        value: f64,
        revalidation: bool,
    },
    SubmitPocBatch {
        poc_stage_start_block_height: u64,
        batch_id: String,
        node_id: String,
        nonces: Vec<i64>,
        dist: Vec<f64>,
    },
    SubmitPocValidation {
        poc_stage_start_block_height: u64,
        validated_participant: String,
        nonces: Vec<i64>,
        dist: Vec<f64>,
        received_dist: Vec<f64>,
        r_target: f64,
        fraud_threshold: f64,
        n_invalid: i64,
        probability_honest: f64,
        fraud_detected: bool,
    },
    StartInference {
        inference_id: String,
        prompt_hash: String,
        prompt_payload: String,
        model: String,
        requested_by: String,
        assigned_to: String,
        node_version: String,
        max_tokens: u64,
        prompt_token_count: u64,
        request_timestamp: i64,
    },
    FinishInference {
        inference_id: String,
        response_hash: String,
        response_payload: String,
        prompt_token_count: u64,
        completion_token_count: u64,
        executed_by: String,
        transferred_by: String,
        request_timestamp: i64,
    },
    SubmitHardwareDiff {
        node_id: String,
        hardware: Vec<HardwareItem>,
    },
}

impl ChainMsg {
    pub fn type_url(&self) -> &'static str {
        match self {
            Self::SubmitSeed { .. } => "/inference.v1.MsgSubmitSeed",
            Self::ClaimRewards { .. } => "/inference.v1.MsgClaimRewards",
            Self::Validation { .. } => "/inference.v1.MsgValidation",
            Self::SubmitPocBatch { .. } => "/inference.v1.MsgSubmitPocBatch",
            Self::SubmitPocValidation { .. } => "/inference.v1.MsgSubmitPocValidation",
            Self::StartInference { .. } => "/inference.v1.MsgStartInference",
            Self::FinishInference { .. } => "/inference.v1.MsgFinishInference",
            Self::SubmitHardwareDiff { .. } => "/inference.v1.MsgSubmitHardwareDiff",
        }
    }

    /// Subject name when this message type goes through the batch consumer.
    pub fn batch_subject(&self) -> Option<&'static str> {
        match self {
            Self::StartInference { .. } => Some("inference.start"),
            Self::FinishInference { .. } => Some("inference.finish"),
            _ => None,
        }
    }

    /// Key used to drop duplicate submissions within one batch.
    pub fn dedup_key(&self) -> Option<String> {
        match self {
            Self::StartInference { inference_id, .. } => {
                Some(format!("start:{inference_id}"))
            }
            Self::FinishInference { inference_id, .. } => {
                Some(format!("finish:{inference_id}"))
            }
            _ => None,
        }
    }

    /// Encodes to the protobuf `Any` with `participant` as the acting address.
    pub(crate) fn to_any(&self, participant: &str) -> proto::Any {
        match self.clone() {
            Self::SubmitSeed {
                epoch_index,
                signature,
            } => proto::Any::pack(
                self.type_url(),
                &proto::MsgSubmitSeed {
                    participant: participant.to_owned(),
                    epoch_index,
                    signature,
                },
            ),
            Self::ClaimRewards { seed, epoch_index } => proto::Any::pack(
                self.type_url(),
                &proto::MsgClaimRewards {
                    participant: participant.to_owned(),
                    seed,
                    epoch_index,
                },
            ),
            Self::Validation {
                id,
                inference_id,
                response_payload,
                response_hash,
                value,
                revalidation,
            } => proto::Any::pack(
                self.type_url(),
                &proto::MsgValidation {
                    id,
                    participant: participant.to_owned(),
                    inference_id,
                    response_payload,
                    response_hash,
                    value,
                    revalidation,
                },
            ),
            Self::SubmitPocBatch {
                poc_stage_start_block_height,
                batch_id,
                node_id,
                nonces,
                dist,
            } => proto::Any::pack(
                self.type_url(),
                &proto::MsgSubmitPocBatch {
                    participant: participant.to_owned(),
                    poc_stage_start_block_height,
                    batch_id,
                    nonces,
                    dist,
                    node_id,
                },
            ),
            Self::SubmitPocValidation {
                poc_stage_start_block_height,
                validated_participant,
                nonces,
                dist,
                received_dist,
                r_target,
                fraud_threshold,
                n_invalid,
                probability_honest,
                fraud_detected,
            } => proto::Any::pack(
                self.type_url(),
                &proto::MsgSubmitPocValidation {
                    participant: participant.to_owned(),
                    poc_stage_start_block_height,
                    validated_participant,
                    nonces,
                    dist,
                    received_dist,
                    r_target,
                    fraud_threshold,
                    n_invalid,
                    probability_honest,
                    fraud_detected,
                },
            ),
            Self::StartInference {
                inference_id,
                prompt_hash,
                prompt_payload,
                model,
                requested_by,
                assigned_to,
                node_version,
                max_tokens,
                prompt_token_count,
                request_timestamp,
            } => proto::Any::pack(
                self.type_url(),
                &proto::MsgStartInference {
                    inference_id,
                    prompt_hash,
                    prompt_payload,
                    model,
                    requested_by,
                    assigned_to,
                    node_version,
                    max_tokens,
                    prompt_token_count,
                    request_timestamp,
                },
            ),
            Self::FinishInference {
                inference_id,
                response_hash,
                response_payload,
                prompt_token_count,
                completion_token_count,
                executed_by,
                transferred_by,
                request_timestamp,
            } => proto::Any::pack(
                self.type_url(),
                &proto::MsgFinishInference {
                    inference_id,
                    response_hash,
                    response_payload,
                    prompt_token_count,
                    completion_token_count,
                    executed_by,
                    transferred_by,
                    request_timestamp,
                },
            ),
            Self::SubmitHardwareDiff { node_id, hardware } => proto::Any::pack(
                self.type_url(),
                &proto::MsgSubmitHardwareDiff {
                    participant: participant.to_owned(),
                    node_id,
                    hardware: hardware
                        .into_iter()
                        .map(|item| proto::HardwareComponent {
                            hw_type: item.hw_type,
                            count: item.count,
                        })
                        .collect(),
                },
            ),
        }
    }
}
