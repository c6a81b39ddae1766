use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of an ML-node, both intended and observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Unknown,
    Poc,
    Inference,
    Stopped,
    Failed,
    Training,
}

/// PoC sub-status of an ML-node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PocStatus {
    Idle,
    Generating,
    Validating,
}

/// How to reach an ML-node. Exactly one of the two variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeAddress {
    HostPorts {
        host: String,
        inference_port: u16,
        poc_port: u16,
        #[serde(default)]
        inference_segment: String,
        #[serde(default)]
        poc_segment: String,
    },
    BaseUrl { base_url: String },
}

impl NodeAddress {
    /// Root URL of the inference HTTP API, without a trailing slash.
    pub fn inference_url(&self) -> String {
        match self {
            Self::HostPorts {
                host,
                inference_port,
                inference_segment,
                ..
            } => format!(
                "http://{host}:{inference_port}{}",
                normalize_segment(inference_segment)
            ),
            Self::BaseUrl { base_url } => base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Root URL of the PoC HTTP/WebSocket API, without a trailing slash.
    pub fn poc_url(&self) -> String {
        match self {
            Self::HostPorts {
                host,
                poc_port,
                poc_segment,
                ..
            } => format!("http://{host}:{poc_port}{}", normalize_segment(poc_segment)),
            Self::BaseUrl { base_url } => base_url.trim_end_matches('/').to_owned(),
        }
    }
}

fn normalize_segment(segment: &str) -> String {
    let trimmed = segment.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Arguments one model is served with, order preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub args: Vec<String>,
}

/// One hardware item as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareItem {
    #[serde(rename = "type")]
    pub hw_type: String,
    pub count: u32,
}

/// Validated configuration of a registered ML-node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceNodeConfig {
    pub id: String,
    pub address: NodeAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub models: BTreeMap<String, ModelConfig>,
    #[serde(default)]
    pub hardware: Vec<HardwareItem>,
    pub max_concurrent: u32,
}

impl InferenceNodeConfig {
    pub fn supports_model(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }
}

/// Raw node description as accepted over YAML and the admin API.
///
/// Address fields are all optional here; [`NodeSpec::into_config`] enforces
/// the exactly-one-address rule and the remaining invariants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub inference_port: Option<u16>,
    #[serde(default)]
    pub poc_port: Option<u16>,
    #[serde(default)]
    pub inference_segment: Option<String>,
    #[serde(default)]
    pub poc_segment: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
    #[serde(default)]
    pub hardware: Vec<HardwareItem>,
    #[serde(default)]
    pub max_concurrent: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeConfigError {
    #[error("node id must not be empty")]
    EmptyId,
    #[error("node {0}: both base_url and host/port address given")]
    AmbiguousAddress(String),
    #[error("node {0}: no address given")]
    MissingAddress(String),
    #[error("node {0}: base_url must be http or https")]
    InvalidBaseUrl(String),
    #[error("node {0}: at least one model is required")]
    NoModels(String),
    #[error("node {0}: max_concurrent must be positive")]
    ZeroConcurrency(String),
}

impl NodeSpec {
    /// Validates the raw spec into an [`InferenceNodeConfig`].
    pub fn into_config(self) -> Result<InferenceNodeConfig, NodeConfigError> {
        if self.id.is_empty() {
            return Err(NodeConfigError::EmptyId);
        }

        let has_host_parts = self.host.is_some()
            || self.inference_port.is_some()
            || self.poc_port.is_some()
            || self.inference_segment.is_some()
            || self.poc_segment.is_some();

        let address = match (self.base_url, has_host_parts) {
            (Some(_), true) => return Err(NodeConfigError::AmbiguousAddress(self.id)),
            (None, false) => return Err(NodeConfigError::MissingAddress(self.id)),
            (Some(url), false) => {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(NodeConfigError::InvalidBaseUrl(self.id));
                }
                NodeAddress::BaseUrl { base_url: url }
            }
            (None, true) => {
                let (Some(host), Some(inference_port), Some(poc_port)) =
                    (self.host, self.inference_port, self.poc_port)
                else {
                    return Err(NodeConfigError::MissingAddress(self.id));
                };
                NodeAddress::HostPorts {
                    host,
                    inference_port,
                    poc_port,
                    inference_segment: self.inference_segment.unwrap_or_default(),
                    poc_segment: self.poc_segment.unwrap_or_default(),
                }
            }
        };

        if self.models.is_empty() {
            return Err(NodeConfigError::NoModels(self.id));
        }
        if self.max_concurrent == 0 {
            return Err(NodeConfigError::ZeroConcurrency(self.id));
        }

        Ok(InferenceNodeConfig {
            id: self.id,
            address,
            auth_token: self.auth_token,
            models: self.models,
            hardware: self.hardware,
            max_concurrent: self.max_concurrent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_with_base_url() -> NodeSpec {
        NodeSpec {
            id: "n1".to_owned(),
            base_url: Some("http://10.0.0.1:8080".to_owned()),
            models: BTreeMap::from([("llama-3".to_owned(), ModelConfig::default())]),
            max_concurrent: 4,
            ..Default::default()
        }
    }

    #[test]
    fn accepts_base_url_address() {
        let config = spec_with_base_url().into_config().unwrap();
        assert_eq!(config.address.inference_url(), "http://10.0.0.1:8080");
        assert_eq!(config.address.poc_url(), "http://10.0.0.1:8080");
    }

    #[test]
    fn rejects_both_address_forms() {
        let mut spec = spec_with_base_url();
        spec.host = Some("10.0.0.1".to_owned());
        assert_eq!(
            spec.into_config(),
            Err(NodeConfigError::AmbiguousAddress("n1".to_owned()))
        );
    }

    #[test]
    fn rejects_missing_address() {
        let mut spec = spec_with_base_url();
        spec.base_url = None;
        assert_eq!(
            spec.into_config(),
            Err(NodeConfigError::MissingAddress("n1".to_owned()))
        );
    }

    #[test]
    fn rejects_non_http_base_url() {
        let mut spec = spec_with_base_url();
        spec.base_url = Some("ftp://10.0.0.1".to_owned());
        assert!(matches!(
            spec.into_config(),
            Err(NodeConfigError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn rejects_empty_model_map() {
        let mut spec = spec_with_base_url();
        spec.models.clear();
        assert!(matches!(spec.into_config(), Err(NodeConfigError::NoModels(_))));
    }

    #[test]
    fn host_ports_urls_include_segments() {
        let spec = NodeSpec {
            id: "n2".to_owned(),
            host: Some("ml0".to_owned()),
            inference_port: Some(8080),
            poc_port: Some(8081),
            inference_segment: Some("/v1/".to_owned()),
            poc_segment: None,
            models: BTreeMap::from([("m".to_owned(), ModelConfig::default())]),
            max_concurrent: 1,
            ..Default::default()
        };
        let config = spec.into_config().unwrap();
        assert_eq!(config.address.inference_url(), "http://ml0:8080/v1");
        assert_eq!(config.address.poc_url(), "http://ml0:8081");
    }
}
