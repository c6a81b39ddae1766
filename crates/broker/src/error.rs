use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("invalid node config: {0}")]
    InvalidConfig(#[from] infernet_primitives::NodeConfigError),

    #[error("unknown node '{0}'")]
    UnknownNode(String),

    #[error("node '{0}' already registered")]
    DuplicateNode(String),

    #[error("model '{model}' is not in the governance model list")]
    ModelNotGoverned { model: String },

    #[error("store: {0}")]
    Store(String),

    #[error("broker is shutting down")]
    Closed,
}

impl From<infernet_db::DbError> for BrokerError {
    fn from(err: infernet_db::DbError) -> Self {
        Self::Store(err.to_string())
    }
}
