//! Client for another participant's public executor API.

use std::time::Duration;

use infernet_chain::Signer;
use serde::Deserialize;

use crate::NodeClientError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Payloads of one inference as served by its executor.
#[derive(Debug, Clone, Deserialize)]
pub struct PayloadsResponse {
    pub prompt_payload: String,
    pub response_payload: String,
    #[serde(default)]
    pub prompt_hash: String,
}

#[derive(Debug, Clone)]
pub struct ExecutorClient {
    http: reqwest::Client,
}

impl ExecutorClient {
    pub fn new() -> Result<Self, NodeClientError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| NodeClientError::Transport(e.to_string()))?;
        Ok(Self { http })
    }

    /// Fetches prompt/response payloads with signed validator headers.
    pub async fn inference_payloads(
        &self,
        executor_url: &str,
        inference_id: &str,
        signer: &Signer,
        timestamp: i64,
    ) -> Result<PayloadsResponse, NodeClientError> {
        let url = format!(
            "{}/v1/inference/{}/payloads",
            executor_url.trim_end_matches('/'),
            urlencode(inference_id)
        );

        let mut request = self.http.get(url);
        for (name, value) in signer.payload_request_headers(inference_id, timestamp) {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return if status.is_client_error() {
                Err(NodeClientError::Application {
                    status: status.as_u16(),
                    body,
                })
            } else {
                Err(NodeClientError::Transport(format!("{status}: {body}")))
            };
        }

        response
            .json()
            .await
            .map_err(|e| NodeClientError::Decode(e.to_string()))
    }
}

/// Inference ids are base64 and may carry `/` and `+`.
fn urlencode(raw: &str) -> String {
    raw.chars()
        .flat_map(|c| match c {
            '/' => "%2F".chars().collect::<Vec<_>>(),
            '+' => "%2B".chars().collect(),
            '=' => "%3D".chars().collect(),
            other => vec![other],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_ids_are_path_safe() {
        assert_eq!(urlencode("ab/c+d="), "ab%2Fc%2Bd%3D");
        assert_eq!(urlencode("plain"), "plain");
    }
}
