use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("rpc: {0}")]
    Rpc(#[from] jsonrpsee::core::ClientError),

    #[error("grpc: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("grpc transport: {0}")]
    GrpcTransport(#[from] tonic::transport::Error),

    #[error("websocket: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("decoding response: {0}")]
    Decode(String),

    #[error("signing: {0}")]
    Signing(String),

    #[error("keyring: {0}")]
    Keyring(String),
}

impl ChainError {
    pub(crate) fn decode(context: impl Into<String>) -> Self {
        Self::Decode(context.into())
    }
}
