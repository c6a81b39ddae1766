//! Client seams consumed by the rest of the control plane.

use async_trait::async_trait;
use infernet_config::{BandwidthParams, ValidationParams};
use infernet_primitives::{Epoch, EpochParams, InferenceRecord};

use crate::{
    broadcast::{BroadcastResponse, TxBroadcaster, TxLookup},
    BlockResults, ChainError, ChainMsg, ChainStatus, GrpcQueryClient, RpcClient,
};

/// Pending reward computed by the chain for a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleAmount {
    pub total_amount: u64,
    pub epoch_index: u64,
}

/// On-chain registry entry for a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    /// Public URL of the participant's executor API.
    pub inference_url: String,
    pub power: u64,
}

/// Read access to block-level chain data.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn status(&self) -> Result<ChainStatus, ChainError>;

    async fn block_results(&self, height: u64) -> Result<BlockResults, ChainError>;
}

#[async_trait]
impl ChainReader for RpcClient {
    async fn status(&self) -> Result<ChainStatus, ChainError> {
        RpcClient::status(self).await
    }

    async fn block_results(&self, height: u64) -> Result<BlockResults, ChainError> {
        RpcClient::block_results(self, height).await
    }
}

/// Module-level state queries served over gRPC.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait ChainQuery: Send + Sync {
    async fn current_epoch(&self) -> Result<(Epoch, EpochParams), ChainError>;

    async fn inference(&self, inference_id: String) -> Result<Option<InferenceRecord>, ChainError>;

    async fn epoch_inferences(&self, epoch_index: u64) -> Result<Vec<InferenceRecord>, ChainError>;

    async fn epoch_validated_ids(
        &self,
        epoch_index: u64,
        participant: String,
    ) -> Result<Vec<String>, ChainError>;

    async fn validation_params(&self) -> Result<ValidationParams, ChainError>;

    async fn bandwidth_params(&self) -> Result<BandwidthParams, ChainError>;

    async fn settle_amount(&self, participant: String) -> Result<Option<SettleAmount>, ChainError>;

    async fn participant(&self, participant: String) -> Result<Option<ParticipantInfo>, ChainError>;

    async fn governance_models(&self) -> Result<Vec<String>, ChainError>;
}

#[async_trait]
impl ChainQuery for GrpcQueryClient {
    async fn current_epoch(&self) -> Result<(Epoch, EpochParams), ChainError> {
        GrpcQueryClient::current_epoch(self).await
    }

    async fn inference(&self, inference_id: String) -> Result<Option<InferenceRecord>, ChainError> {
        GrpcQueryClient::inference(self, &inference_id).await
    }

    async fn epoch_inferences(&self, epoch_index: u64) -> Result<Vec<InferenceRecord>, ChainError> {
        GrpcQueryClient::epoch_inferences(self, epoch_index).await
    }

    async fn epoch_validated_ids(
        &self,
        epoch_index: u64,
        participant: String,
    ) -> Result<Vec<String>, ChainError> {
        GrpcQueryClient::epoch_validated_ids(self, epoch_index, &participant).await
    }

    async fn validation_params(&self) -> Result<ValidationParams, ChainError> {
        GrpcQueryClient::validation_params(self).await
    }

    async fn bandwidth_params(&self) -> Result<BandwidthParams, ChainError> {
        GrpcQueryClient::bandwidth_params(self).await
    }

    async fn settle_amount(&self, participant: String) -> Result<Option<SettleAmount>, ChainError> {
        GrpcQueryClient::settle_amount(self, &participant).await
    }

    async fn participant(&self, participant: String) -> Result<Option<ParticipantInfo>, ChainError> {
        GrpcQueryClient::participant(self, &participant).await
    }

    async fn governance_models(&self) -> Result<Vec<String>, ChainError> {
        GrpcQueryClient::governance_models(self).await
    }
}

/// Signing broadcast path used by the transaction manager.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// The participant address messages act for.
    fn participant(&self) -> String;

    async fn broadcast(
        &self,
        msgs: Vec<ChainMsg>,
        timeout_ns: u64,
    ) -> Result<BroadcastResponse, ChainError>;

    async fn query_tx(&self, tx_hash: String) -> Result<Option<TxLookup>, ChainError>;

    async fn wait_for_inclusion(&self, tx_hash: String) -> Result<Option<TxLookup>, ChainError>;
}

#[async_trait]
impl Broadcaster for TxBroadcaster {
    fn participant(&self) -> String {
        self.account_address().to_owned()
    }

    async fn broadcast(
        &self,
        msgs: Vec<ChainMsg>,
        timeout_ns: u64,
    ) -> Result<BroadcastResponse, ChainError> {
        TxBroadcaster::broadcast(self, &msgs, timeout_ns).await
    }

    async fn query_tx(&self, tx_hash: String) -> Result<Option<TxLookup>, ChainError> {
        TxBroadcaster::query_tx(self, &tx_hash).await
    }

    async fn wait_for_inclusion(&self, tx_hash: String) -> Result<Option<TxLookup>, ChainError> {
        TxBroadcaster::wait_for_inclusion(self, &tx_hash).await
    }
}
