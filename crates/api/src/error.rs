use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use infernet_broker::BrokerError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("store: {0}")]
    Store(String),

    #[error("not found")]
    NotFound,

    #[error("upstream node failure: {0}")]
    Upstream(String),
}

impl From<infernet_db::DbError> for ApiError {
    fn from(err: infernet_db::DbError) -> Self {
        Self::Store(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Broker(BrokerError::InvalidConfig(_))
            | Self::Broker(BrokerError::DuplicateNode(_))
            | Self::Broker(BrokerError::ModelNotGoverned { .. }) => StatusCode::BAD_REQUEST,
            Self::Broker(BrokerError::UnknownNode(_)) | Self::NotFound => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
