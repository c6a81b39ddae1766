//! Config file loading and environment override application.

use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::{Config, ConfigError};

/// Environment prefix for config overrides. `DAPI_API__ADMIN_PORT` maps to
/// the dotted path `api.admin_port`.
const ENV_PREFIX: &str = "DAPI_";

type Override = (String, Value);

/// Loads the YAML config from `path` and applies any `DAPI_*` environment
/// overrides on top of it.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let mut value: Value = serde_yaml::from_str(&raw)?;
    let overrides = collect_env_overrides(std::env::vars());
    if let Some(mapping) = value.as_mapping_mut() {
        apply_env_overrides(mapping, overrides)?;
    }

    Ok(serde_yaml::from_value(value)?)
}

fn collect_env_overrides(vars: impl Iterator<Item = (String, String)>) -> Vec<Override> {
    vars.filter_map(|(key, value)| {
        let stripped = key.strip_prefix(ENV_PREFIX)?;
        let path = stripped.to_ascii_lowercase().replace("__", ".");
        Some((path, parse_value(&value)))
    })
    .collect()
}

/// Applies dotted-path overrides to a YAML mapping. Intermediate mappings
/// must already exist; scalar segments along the way are an error.
pub fn apply_env_overrides(
    mapping: &mut Mapping,
    overrides: Vec<Override>,
) -> Result<(), ConfigError> {
    for (path, value) in overrides {
        apply_override_inner(&path, &path, value, mapping)?;
    }
    Ok(())
}

/// Parses a `key=value` override string, e.g. from a CLI flag.
pub fn parse_override(override_str: &str) -> Result<Override, ConfigError> {
    let (key, value_str) = override_str
        .split_once('=')
        .ok_or_else(|| ConfigError::InvalidOverride {
            override_str: override_str.to_owned(),
        })?;
    Ok((key.to_owned(), parse_value(value_str)))
}

fn apply_override_inner(
    original_path: &str,
    remaining_path: &str,
    value: Value,
    mapping: &mut Mapping,
) -> Result<(), ConfigError> {
    match remaining_path.split_once('.') {
        None => {
            mapping.insert(Value::String(remaining_path.to_owned()), value);
            Ok(())
        }
        Some((key, rest)) => match mapping.get_mut(key) {
            Some(Value::Mapping(inner)) => apply_override_inner(original_path, rest, value, inner),
            Some(_) => Err(ConfigError::TraverseNonMappingAt {
                key: key.to_owned(),
                path: original_path.to_owned(),
            }),
            None => {
                // Build the missing mapping chain so env-only sections work.
                let mut inner = Mapping::new();
                apply_override_inner(original_path, rest, value, &mut inner)?;
                mapping.insert(Value::String(key.to_owned()), Value::Mapping(inner));
                Ok(())
            }
        },
    }
}

/// Parses a string as `i64`, then `f64`, then `bool`, defaulting to string.
fn parse_value(str_value: &str) -> Value {
    str_value
        .parse::<i64>()
        .map(Value::from)
        .or_else(|_| str_value.parse::<f64>().map(Value::from))
        .or_else(|_| str_value.parse::<bool>().map(Value::from))
        .unwrap_or_else(|_| Value::String(str_value.to_owned()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MINIMAL_YAML: &str = r#"
chain_node:
  rpc_url: "http://localhost:26657"
  ws_url: "ws://localhost:26657/websocket"
  grpc_url: "http://localhost:9090"
  chain_id: "infernet-1"
  account_address: "part1main"
  signer_key_name: "api"
  signer_address: "part1api"
nodes:
  - id: "n1"
    base_url: "http://ml0:8080"
    models:
      llama-3: {}
    max_concurrent: 2
"#;

    #[test]
    fn loads_minimal_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL_YAML.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.chain_node.account_address, "part1main");
        assert!(config.chain_node.uses_grantee_signer());
        assert_eq!(config.nodes.len(), 1);
        assert_eq!(config.reconcile.poc_blocks, 5);
    }

    #[test]
    fn env_override_reaches_nested_key() {
        let mut value: Value = serde_yaml::from_str(MINIMAL_YAML).unwrap();
        let mapping = value.as_mapping_mut().unwrap();

        apply_env_overrides(
            mapping,
            vec![("chain_node.halt_timeout_secs".to_owned(), Value::from(7))],
        )
        .unwrap();

        let config: Config = serde_yaml::from_value(value).unwrap();
        assert_eq!(config.chain_node.halt_timeout_secs, 7);
    }

    #[test]
    fn override_creates_missing_section() {
        let mut mapping = Mapping::new();
        apply_env_overrides(
            &mut mapping,
            vec![("bus.flush_size".to_owned(), Value::from(10))],
        )
        .unwrap();

        let bus = mapping.get("bus").and_then(Value::as_mapping).unwrap();
        assert_eq!(bus.get("flush_size"), Some(&Value::from(10)));
    }

    #[test]
    fn parse_override_splits_and_types() {
        let (key, value) = parse_override("api.admin_listen_addr=0.0.0.0:9201").unwrap();
        assert_eq!(key, "api.admin_listen_addr");
        assert_eq!(value, Value::String("0.0.0.0:9201".to_owned()));

        let (_, value) = parse_override("x=42").unwrap();
        assert_eq!(value, Value::from(42));
    }
}
