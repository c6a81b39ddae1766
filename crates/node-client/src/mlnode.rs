use std::time::Duration;

use infernet_primitives::InferenceNodeConfig;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::{
    types::{
        DiskInfo, GpuDevice, InferenceUpRequest, ModelInfo, NodeStateResponse, PocInitRequest,
        PowStatusResponse,
    },
    NodeClientError,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Dedicated HTTP client for one ML-node.
#[derive(Debug, Clone)]
pub struct MlNodeClient {
    http: reqwest::Client,
    inference_url: String,
    poc_url: String,
    auth_token: Option<String>,
}

impl MlNodeClient {
    pub fn new(config: &InferenceNodeConfig) -> Result<Self, NodeClientError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| NodeClientError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            inference_url: config.address.inference_url(),
            poc_url: config.address.poc_url(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn poc_url(&self) -> &str {
        &self.poc_url
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Maps 4xx to application errors and 5xx/transport to transport errors.
    async fn check(response: Response) -> Result<Response, NodeClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            Err(NodeClientError::Application {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(NodeClientError::Transport(format!("{status}: {body}")))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, NodeClientError> {
        let response = Self::check(self.request(Method::GET, url).send().await?).await?;
        response
            .json()
            .await
            .map_err(|e| NodeClientError::Decode(e.to_string()))
    }

    async fn post_unit<B: serde::Serialize>(
        &self,
        url: String,
        body: &B,
    ) -> Result<(), NodeClientError> {
        Self::check(self.request(Method::POST, url).json(body).send().await?).await?;
        Ok(())
    }

    // --- PoC surface ---

    pub async fn init_generate(&self, request: &PocInitRequest) -> Result<(), NodeClientError> {
        self.post_unit(format!("{}/poc/init-generate", self.poc_url), request)
            .await
    }

    pub async fn init_validate(&self, request: &PocInitRequest) -> Result<(), NodeClientError> {
        self.post_unit(format!("{}/poc/init-validate", self.poc_url), request)
            .await
    }

    pub async fn state(&self) -> Result<NodeStateResponse, NodeClientError> {
        self.get_json(format!("{}/state", self.poc_url)).await
    }

    /// Requests a managed state transition, e.g. `"STOPPED"`.
    pub async fn set_state(&self, state: &str) -> Result<(), NodeClientError> {
        self.post_unit(
            format!("{}/state", self.poc_url),
            &serde_json::json!({ "state": state }),
        )
        .await
    }

    pub async fn pow_status(&self) -> Result<PowStatusResponse, NodeClientError> {
        self.get_json(format!("{}/pow/status", self.poc_url)).await
    }

    // --- inference surface ---

    pub async fn inference_up(&self, request: &InferenceUpRequest) -> Result<(), NodeClientError> {
        self.post_unit(format!("{}/inference/up", self.inference_url), request)
            .await
    }

    pub async fn inference_health(&self) -> Result<bool, NodeClientError> {
        let url = format!("{}/inference/health", self.inference_url);
        match self.request(Method::GET, url).send().await {
            Ok(response) => Ok(response.status() == StatusCode::OK),
            Err(err) if err.is_timeout() || err.is_connect() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn chat_completions(
        &self,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, NodeClientError> {
        let url = format!("{}/v1/chat/completions", self.inference_url);
        let response = Self::check(self.request(Method::POST, url).json(body).send().await?).await?;
        response
            .json()
            .await
            .map_err(|e| NodeClientError::Decode(e.to_string()))
    }

    pub async fn tokenize(&self, body: &serde_json::Value) -> Result<serde_json::Value, NodeClientError> {
        let url = format!("{}/v1/tokenize", self.inference_url);
        let response = Self::check(self.request(Method::POST, url).json(body).send().await?).await?;
        response
            .json()
            .await
            .map_err(|e| NodeClientError::Decode(e.to_string()))
    }

    // --- hardware surface ---

    pub async fn models(&self) -> Result<Vec<ModelInfo>, NodeClientError> {
        self.get_json(format!("{}/models", self.inference_url)).await
    }

    pub async fn gpu_devices(&self) -> Result<Vec<GpuDevice>, NodeClientError> {
        self.get_json(format!("{}/gpu/devices", self.poc_url)).await
    }

    pub async fn gpu_driver(&self) -> Result<String, NodeClientError> {
        self.get_json(format!("{}/gpu/driver", self.poc_url)).await
    }

    pub async fn disk(&self) -> Result<DiskInfo, NodeClientError> {
        self.get_json(format!("{}/disk", self.poc_url)).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use infernet_primitives::{ModelConfig, NodeSpec};

    use super::*;

    #[test]
    fn urls_derive_from_node_address() {
        let config = NodeSpec {
            id: "n1".into(),
            host: Some("ml0".into()),
            inference_port: Some(8080),
            poc_port: Some(5000),
            models: BTreeMap::from([("m".to_owned(), ModelConfig::default())]),
            max_concurrent: 1,
            ..Default::default()
        }
        .into_config()
        .unwrap();

        let client = MlNodeClient::new(&config).unwrap();
        assert_eq!(client.poc_url(), "http://ml0:5000");
        assert_eq!(client.inference_url, "http://ml0:8080");
    }
}
