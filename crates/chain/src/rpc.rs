//! Tendermint JSON-RPC client over HTTP.

use std::time::Duration;

use jsonrpsee::{
    core::{client::ClientT, params::ObjectParams},
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use serde::Deserialize;

use crate::{
    types::{parse_height, BlockResultsResponse, StatusResponse},
    BlockResults, ChainError, ChainStatus,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RpcClient {
    client: HttpClient,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self, ChainError> {
        let client = HttpClientBuilder::default()
            .request_timeout(REQUEST_TIMEOUT)
            .build(url)?;
        Ok(Self { client })
    }

    pub async fn status(&self) -> Result<ChainStatus, ChainError> {
        let resp: StatusResponse = self.client.request("status", rpc_params![]).await?;
        resp.try_into()
    }

    pub async fn block_results(&self, height: u64) -> Result<BlockResults, ChainError> {
        let mut params = ObjectParams::new();
        params
            .insert("height", height.to_string())
            .map_err(|e| ChainError::decode(e.to_string()))?;
        let resp: BlockResultsResponse = self.client.request("block_results", params).await?;
        resp.try_into()
    }

    /// Broadcasts a signed transaction without waiting for inclusion.
    pub async fn broadcast_tx_sync(&self, raw_tx: &[u8]) -> Result<BroadcastTxResponse, ChainError> {
        use base64::Engine as _;
        let mut params = ObjectParams::new();
        params
            .insert("tx", base64::engine::general_purpose::STANDARD.encode(raw_tx))
            .map_err(|e| ChainError::decode(e.to_string()))?;
        let resp: BroadcastTxResponse = self.client.request("broadcast_tx_sync", params).await?;
        Ok(resp)
    }

    /// Looks a transaction up by hex hash. `Ok(None)` when not yet included.
    pub async fn tx(&self, hash_hex: &str) -> Result<Option<TxQueryResponse>, ChainError> {
        let mut params = ObjectParams::new();
        params
            .insert("hash", format!("0x{hash_hex}"))
            .map_err(|e| ChainError::decode(e.to_string()))?;
        match self
            .client
            .request::<TxQueryResponse, _>("tx", params)
            .await
        {
            Ok(resp) => Ok(Some(resp)),
            Err(jsonrpsee::core::ClientError::Call(err)) => {
                // The RPC answers "not found" as a call error.
                if err.message().contains("not found") {
                    Ok(None)
                } else {
                    Err(ChainError::decode(err.to_string()))
                }
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastTxResponse {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub log: String,
    pub hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxQueryResponse {
    pub hash: String,
    pub height: String,
    pub tx_result: TxQueryResult,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxQueryResult {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub log: String,
}

impl TxQueryResponse {
    pub fn height_u64(&self) -> Result<u64, ChainError> {
        parse_height(&self.height)
    }
}
