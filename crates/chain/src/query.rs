//! gRPC query client for the inference module.

use infernet_config::{BandwidthParams, ValidationParams};
use infernet_primitives::{Epoch, EpochParams, InferenceRecord, InferenceStatus};
use tonic::{
    codegen::http::uri::PathAndQuery,
    transport::{Channel, Endpoint},
};

use crate::{
    proto,
    traits::{ParticipantInfo, SettleAmount},
    ChainError,
};

#[derive(Debug, Clone)]
pub struct GrpcQueryClient {
    channel: Channel,
}

impl GrpcQueryClient {
    pub fn new(url: &str) -> Result<Self, ChainError> {
        let channel = Endpoint::from_shared(url.to_owned())
            .map_err(ChainError::GrpcTransport)?
            .connect_lazy();
        Ok(Self { channel })
    }

    async fn unary<Req, Resp>(&self, path: &'static str, request: Req) -> Result<Resp, ChainError>
    where
        Req: prost::Message + 'static,
        Resp: prost::Message + Default + 'static,
    {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready().await.map_err(ChainError::GrpcTransport)?;
        let codec: tonic::codec::ProstCodec<Req, Resp> = tonic::codec::ProstCodec::default();
        let response = grpc
            .unary(
                tonic::Request::new(request),
                PathAndQuery::from_static(path),
                codec,
            )
            .await?;
        Ok(response.into_inner())
    }

    pub async fn current_epoch(&self) -> Result<(Epoch, EpochParams), ChainError> {
        let resp: proto::QueryCurrentEpochResponse = self
            .unary(
                "/inference.v1.Query/CurrentEpoch",
                proto::QueryCurrentEpochRequest {},
            )
            .await?;
        let params = resp
            .params
            .ok_or_else(|| ChainError::decode("epoch params missing from response"))?;
        Ok((
            Epoch::new(resp.epoch_index, resp.poc_start_block_height),
            EpochParams {
                epoch_length: params.epoch_length,
                poc_stage_duration: params.poc_stage_duration,
                poc_validation_delay: params.poc_validation_delay,
                poc_validation_duration: params.poc_validation_duration,
                set_new_validators_delay: params.set_new_validators_delay,
                inference_validation_cutoff: params.inference_validation_cutoff,
            },
        ))
    }

    pub async fn inference(&self, inference_id: &str) -> Result<Option<InferenceRecord>, ChainError> {
        let resp: proto::QueryInferenceResponse = self
            .unary(
                "/inference.v1.Query/Inference",
                proto::QueryInferenceRequest {
                    inference_id: inference_id.to_owned(),
                },
            )
            .await?;
        resp.inference.map(record_from_pb).transpose()
    }

    pub async fn epoch_inferences(&self, epoch_index: u64) -> Result<Vec<InferenceRecord>, ChainError> {
        let resp: proto::QueryEpochInferencesResponse = self
            .unary(
                "/inference.v1.Query/EpochInferences",
                proto::QueryEpochInferencesRequest { epoch_index },
            )
            .await?;
        resp.inferences.into_iter().map(record_from_pb).collect()
    }

    pub async fn epoch_validated_ids(
        &self,
        epoch_index: u64,
        participant: &str,
    ) -> Result<Vec<String>, ChainError> {
        let resp: proto::QueryEpochValidationsResponse = self
            .unary(
                "/inference.v1.Query/EpochValidations",
                proto::QueryEpochValidationsRequest {
                    epoch_index,
                    participant: participant.to_owned(),
                },
            )
            .await?;
        Ok(resp.inference_ids)
    }

    pub async fn validation_params(&self) -> Result<ValidationParams, ChainError> {
        let resp: proto::QueryValidationParamsResponse = self
            .unary(
                "/inference.v1.Query/ValidationParams",
                proto::QueryValidationParamsRequest {},
            )
            .await?;
        Ok(ValidationParams {
            min_validation_probability: resp.min_validation_probability,
            max_validation_probability: resp.max_validation_probability,
            epsilon: resp.epsilon,
            passing_similarity: resp.passing_similarity,
            max_lock_attempts: resp.max_lock_attempts,
        })
    }

    pub async fn bandwidth_params(&self) -> Result<BandwidthParams, ChainError> {
        let resp: proto::QueryBandwidthParamsResponse = self
            .unary(
                "/inference.v1.Query/BandwidthParams",
                proto::QueryBandwidthParamsRequest {},
            )
            .await?;
        Ok(BandwidthParams {
            estimated_limits_per_block_kb: resp.estimated_limits_per_block_kb,
            kb_per_input_token: resp.kb_per_input_token,
            kb_per_output_token: resp.kb_per_output_token,
        })
    }

    pub async fn settle_amount(&self, participant: &str) -> Result<Option<SettleAmount>, ChainError> {
        let resp: proto::QuerySettleAmountResponse = self
            .unary(
                "/inference.v1.Query/SettleAmount",
                proto::QuerySettleAmountRequest {
                    participant: participant.to_owned(),
                },
            )
            .await?;
        if resp.total_amount == 0 {
            return Ok(None);
        }
        Ok(Some(SettleAmount {
            total_amount: resp.total_amount,
            epoch_index: resp.epoch_index,
        }))
    }

    pub async fn participant(&self, participant: &str) -> Result<Option<ParticipantInfo>, ChainError> {
        let resp: proto::QueryParticipantResponse = self
            .unary(
                "/inference.v1.Query/Participant",
                proto::QueryParticipantRequest {
                    participant: participant.to_owned(),
                },
            )
            .await?;
        if resp.inference_url.is_empty() && resp.power == 0 {
            return Ok(None);
        }
        Ok(Some(ParticipantInfo {
            inference_url: resp.inference_url,
            power: resp.power,
        }))
    }

    pub async fn governance_models(&self) -> Result<Vec<String>, ChainError> {
        let resp: proto::QueryGovernanceModelsResponse = self
            .unary(
                "/inference.v1.Query/GovernanceModels",
                proto::QueryGovernanceModelsRequest {},
            )
            .await?;
        Ok(resp.model_ids)
    }
}

fn record_from_pb(pb: proto::InferencePb) -> Result<InferenceRecord, ChainError> {
    let status = match pb.status.as_str() {
        "STARTED" => InferenceStatus::Started,
        "FINISHED" => InferenceStatus::Finished,
        "VALIDATED" => InferenceStatus::Validated,
        "INVALIDATED" => InferenceStatus::Invalidated,
        "EXPIRED" => InferenceStatus::Expired,
        other => return Err(ChainError::decode(format!("unknown inference status '{other}'"))),
    };
    Ok(InferenceRecord {
        inference_id: pb.inference_id,
        prompt_hash: pb.prompt_hash,
        executor_id: pb.executor_id,
        model: pb.model,
        node_version: pb.node_version,
        epoch_id: pb.epoch_id,
        status,
        prompt_payload: (!pb.prompt_payload.is_empty()).then_some(pb.prompt_payload),
        response_payload: (!pb.response_payload.is_empty()).then_some(pb.response_payload),
        total_power: pb.total_power,
        executor_power: pb.executor_power,
    })
}
