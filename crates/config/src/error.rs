use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid override string '{override_str}', expected key=value")]
    InvalidOverride { override_str: String },

    #[error("override key '{key}' in '{path}' traverses a non-mapping value")]
    TraverseNonMappingAt { key: String, path: String },

    #[error("invalid node config: {0}")]
    Node(#[from] infernet_primitives::NodeConfigError),
}
