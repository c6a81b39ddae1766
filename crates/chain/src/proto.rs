//! Hand-modelled protobuf types for the chain wire format.
//!
//! Mirrors the subset of the Cosmos SDK tx types plus the inference module
//! messages this node submits and queries. Field numbers follow the on-chain
//! proto definitions; a production deployment would generate these.

use prost::Message;

// --- google.protobuf / cosmos base ---

#[derive(Clone, PartialEq, Message)]
pub struct Any {
    #[prost(string, tag = "1")]
    pub type_url: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

impl Any {
    pub fn pack<M: Message>(type_url: &str, msg: &M) -> Self {
        Self {
            type_url: type_url.to_owned(),
            value: msg.encode_to_vec(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Message)]
pub struct Timestamp {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Coin {
    #[prost(string, tag = "1")]
    pub denom: String,
    #[prost(string, tag = "2")]
    pub amount: String,
}

// --- cosmos.tx.v1beta1 ---

#[derive(Clone, PartialEq, Message)]
pub struct TxBody {
    #[prost(message, repeated, tag = "1")]
    pub messages: Vec<Any>,
    #[prost(string, tag = "2")]
    pub memo: String,
    #[prost(uint64, tag = "3")]
    pub timeout_height: u64,
    #[prost(bool, tag = "4")]
    pub unordered: bool,
    #[prost(message, optional, tag = "5")]
    pub timeout_timestamp: Option<Timestamp>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AuthInfo {
    #[prost(message, repeated, tag = "1")]
    pub signer_infos: Vec<SignerInfo>,
    #[prost(message, optional, tag = "2")]
    pub fee: Option<Fee>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SignerInfo {
    #[prost(message, optional, tag = "1")]
    pub public_key: Option<Any>,
    #[prost(message, optional, tag = "2")]
    pub mode_info: Option<ModeInfo>,
    #[prost(uint64, tag = "3")]
    pub sequence: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ModeInfo {
    #[prost(oneof = "mode_info::Sum", tags = "1")]
    pub sum: Option<mode_info::Sum>,
}

pub mod mode_info {
    use prost::{Message, Oneof};

    #[derive(Clone, Copy, PartialEq, Message)]
    pub struct Single {
        #[prost(int32, tag = "1")]
        pub mode: i32,
    }

    #[derive(Clone, PartialEq, Oneof)]
    pub enum Sum {
        #[prost(message, tag = "1")]
        Single(Single),
    }
}

/// SIGN_MODE_DIRECT.
pub const SIGN_MODE_DIRECT: i32 = 1;

#[derive(Clone, PartialEq, Message)]
pub struct Fee {
    #[prost(message, repeated, tag = "1")]
    pub amount: Vec<Coin>,
    #[prost(uint64, tag = "2")]
    pub gas_limit: u64,
    #[prost(string, tag = "3")]
    pub payer: String,
    #[prost(string, tag = "4")]
    pub granter: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct SignDoc {
    #[prost(bytes = "vec", tag = "1")]
    pub body_bytes: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub auth_info_bytes: Vec<u8>,
    #[prost(string, tag = "3")]
    pub chain_id: String,
    #[prost(uint64, tag = "4")]
    pub account_number: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxRaw {
    #[prost(bytes = "vec", tag = "1")]
    pub body_bytes: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub auth_info_bytes: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub signatures: Vec<Vec<u8>>,
}

// --- cosmos.crypto.secp256k1 / cosmos.authz.v1beta1 ---

#[derive(Clone, PartialEq, Message)]
pub struct PubKey {
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
}

pub const PUBKEY_TYPE_URL: &str = "/cosmos.crypto.secp256k1.PubKey";

#[derive(Clone, PartialEq, Message)]
pub struct MsgExec {
    #[prost(string, tag = "1")]
    pub grantee: String,
    #[prost(message, repeated, tag = "2")]
    pub msgs: Vec<Any>,
}

pub const MSG_EXEC_TYPE_URL: &str = "/cosmos.authz.v1beta1.MsgExec";

// --- inference module messages ---

#[derive(Clone, PartialEq, Message)]
pub struct MsgSubmitSeed {
    #[prost(string, tag = "1")]
    pub participant: String,
    #[prost(uint64, tag = "2")]
    pub epoch_index: u64,
    #[prost(string, tag = "3")]
    pub signature: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgClaimRewards {
    #[prost(string, tag = "1")]
    pub participant: String,
    #[prost(int64, tag = "2")]
    pub seed: i64,
    #[prost(uint64, tag = "3")]
    pub epoch_index: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgValidation {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub participant: String,
    #[prost(string, tag = "3")]
    pub inference_id: String,
    #[prost(string, tag = "4")]
    pub response_payload: String,
    #[prost(string, tag = "5")]
    pub response_hash: String,
    #[prost(double, tag = "6")]
    pub value: f64,
    #[prost(bool, tag = "7")]
    pub revalidation: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgSubmitPocBatch {
    #[prost(string, tag = "1")]
    pub participant: String,
    #[prost(uint64, tag = "2")]
    pub poc_stage_start_block_height: u64,
    #[prost(string, tag = "3")]
    pub batch_id: String,
    #[prost(int64, repeated, tag = "4")]
    pub nonces: Vec<i64>,
    #[prost(double, repeated, tag = "5")]
    pub dist: Vec<f64>,
    #[prost(string, tag = "6")]
    pub node_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgSubmitPocValidation {
    #[prost(string, tag = "1")]
    pub participant: String,
    #[prost(uint64, tag = "2")]
    pub poc_stage_start_block_height: u64,
    #[prost(string, tag = "3")]
    pub validated_participant: String,
    #[prost(int64, repeated, tag = "4")]
    pub nonces: Vec<i64>,
    #[prost(double, repeated, tag = "5")]
    pub dist: Vec<f64>,
    #[prost(double, repeated, tag = "6")]
    pub received_dist: Vec<f64>,
    #[prost(double, tag = "7")]
    pub r_target: f64,
    #[prost(double, tag = "8")]
    pub fraud_threshold: f64,
    #[prost(int64, tag = "9")]
    pub n_invalid: i64,
    #[prost(double, tag = "10")]
    pub probability_honest: f64,
    #[prost(bool, tag = "11")]
    pub fraud_detected: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgStartInference {
    #[prost(string, tag = "1")]
    pub inference_id: String,
    #[prost(string, tag = "2")]
    pub prompt_hash: String,
    #[prost(string, tag = "3")]
    pub prompt_payload: String,
    #[prost(string, tag = "4")]
    pub model: String,
    #[prost(string, tag = "5")]
    pub requested_by: String,
    #[prost(string, tag = "6")]
    pub assigned_to: String,
    #[prost(string, tag = "7")]
    pub node_version: String,
    #[prost(uint64, tag = "8")]
    pub max_tokens: u64,
    #[prost(uint64, tag = "9")]
    pub prompt_token_count: u64,
    #[prost(int64, tag = "10")]
    pub request_timestamp: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgFinishInference {
    #[prost(string, tag = "1")]
    pub inference_id: String,
    #[prost(string, tag = "2")]
    pub response_hash: String,
    #[prost(string, tag = "3")]
    pub response_payload: String,
    #[prost(uint64, tag = "4")]
    pub prompt_token_count: u64,
    #[prost(uint64, tag = "5")]
    pub completion_token_count: u64,
    #[prost(string, tag = "6")]
    pub executed_by: String,
    #[prost(string, tag = "7")]
    pub transferred_by: String,
    #[prost(int64, tag = "8")]
    pub request_timestamp: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct HardwareComponent {
    #[prost(string, tag = "1")]
    pub hw_type: String,
    #[prost(uint32, tag = "2")]
    pub count: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgSubmitHardwareDiff {
    #[prost(string, tag = "1")]
    pub participant: String,
    #[prost(string, tag = "2")]
    pub node_id: String,
    #[prost(message, repeated, tag = "3")]
    pub hardware: Vec<HardwareComponent>,
}

// --- inference module query ---

#[derive(Clone, PartialEq, Message)]
pub struct QueryCurrentEpochRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct EpochParamsPb {
    #[prost(uint64, tag = "1")]
    pub epoch_length: u64,
    #[prost(uint64, tag = "2")]
    pub poc_stage_duration: u64,
    #[prost(uint64, tag = "3")]
    pub poc_validation_delay: u64,
    #[prost(uint64, tag = "4")]
    pub poc_validation_duration: u64,
    #[prost(uint64, tag = "5")]
    pub set_new_validators_delay: u64,
    #[prost(uint64, tag = "6")]
    pub inference_validation_cutoff: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryCurrentEpochResponse {
    #[prost(uint64, tag = "1")]
    pub epoch_index: u64,
    #[prost(uint64, tag = "2")]
    pub poc_start_block_height: u64,
    #[prost(message, optional, tag = "3")]
    pub params: Option<EpochParamsPb>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryInferenceRequest {
    #[prost(string, tag = "1")]
    pub inference_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct InferencePb {
    #[prost(string, tag = "1")]
    pub inference_id: String,
    #[prost(string, tag = "2")]
    pub prompt_hash: String,
    #[prost(string, tag = "3")]
    pub executor_id: String,
    #[prost(string, tag = "4")]
    pub model: String,
    #[prost(string, tag = "5")]
    pub node_version: String,
    #[prost(uint64, tag = "6")]
    pub epoch_id: u64,
    #[prost(string, tag = "7")]
    pub status: String,
    #[prost(string, tag = "8")]
    pub prompt_payload: String,
    #[prost(string, tag = "9")]
    pub response_payload: String,
    #[prost(uint64, tag = "10")]
    pub total_power: u64,
    #[prost(uint64, tag = "11")]
    pub executor_power: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryInferenceResponse {
    #[prost(message, optional, tag = "1")]
    pub inference: Option<InferencePb>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryEpochInferencesRequest {
    #[prost(uint64, tag = "1")]
    pub epoch_index: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryEpochInferencesResponse {
    #[prost(message, repeated, tag = "1")]
    pub inferences: Vec<InferencePb>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryEpochValidationsRequest {
    #[prost(uint64, tag = "1")]
    pub epoch_index: u64,
    #[prost(string, tag = "2")]
    pub participant: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryEpochValidationsResponse {
    #[prost(string, repeated, tag = "1")]
    pub inference_ids: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryValidationParamsRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct QueryValidationParamsResponse {
    #[prost(double, tag = "1")]
    pub min_validation_probability: f64,
    #[prost(double, tag = "2")]
    pub max_validation_probability: f64,
    #[prost(double, tag = "3")]
    pub epsilon: f64,
    #[prost(double, tag = "4")]
    pub passing_similarity: f64,
    #[prost(uint32, tag = "5")]
    pub max_lock_attempts: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryBandwidthParamsRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct QueryBandwidthParamsResponse {
    #[prost(uint64, tag = "1")]
    pub estimated_limits_per_block_kb: u64,
    #[prost(double, tag = "2")]
    pub kb_per_input_token: f64,
    #[prost(double, tag = "3")]
    pub kb_per_output_token: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct QuerySettleAmountRequest {
    #[prost(string, tag = "1")]
    pub participant: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct QuerySettleAmountResponse {
    #[prost(uint64, tag = "1")]
    pub total_amount: u64,
    #[prost(uint64, tag = "2")]
    pub epoch_index: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryParticipantRequest {
    #[prost(string, tag = "1")]
    pub participant: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryParticipantResponse {
    #[prost(string, tag = "1")]
    pub inference_url: String,
    #[prost(uint64, tag = "2")]
    pub power: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryGovernanceModelsRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct QueryGovernanceModelsResponse {
    #[prost(string, repeated, tag = "1")]
    pub model_ids: Vec<String>,
}
