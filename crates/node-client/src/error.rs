use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeClientError {
    /// Connection-level failure or a 5xx from the node.
    #[error("transport: {0}")]
    Transport(String),

    /// A 4xx the node answered deliberately; retrying will not help.
    #[error("application error {status}: {body}")]
    Application { status: u16, body: String },

    #[error("undecodable response: {0}")]
    Decode(String),

    #[error("websocket: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
}

impl NodeClientError {
    /// Transport errors warrant a status re-query and node skip; application
    /// errors are surfaced as-is.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Ws(_))
    }
}

impl From<reqwest::Error> for NodeClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
