//! Public surface: chat completions and payload retrieval.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use infernet_broker::do_with_locked_node_retry;
use infernet_chain::ChainMsg;
use infernet_db::PromptPayload;
use infernet_node_client::MlNodeClient;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{ApiError, ApiState};

const CHAT_LOCK_ATTEMPTS: u32 = 3;

pub fn public_router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/inference/:id/payloads", get(inference_payloads))
        .with_state(state)
}

/// Forwards a chat request to a locked local node. A transport failure on
/// one node moves on to the next with the failed one skipped.
async fn chat_completions(
    State(state): State<ApiState>,
    Json(request): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let model = request
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let response = do_with_locked_node_retry(
        &state.broker,
        &model,
        None,
        CHAT_LOCK_ATTEMPTS,
        |node| {
            let request = request.clone();
            async move {
                let client = MlNodeClient::new(&node.view.config)?;
                debug!(node_id = %node.view.config.id, "forwarding chat completion");
                client.chat_completions(&request).await
            }
        },
    )
    .await
    .map_err(|err| ApiError::Upstream(err.to_string()))?;

    record_inference(&state, &model, &request, &response);
    Ok(Json(response))
}

/// Records an executed inference: the prompt payload is retained for the
/// payload endpoint and the start/finish messages ride the batch consumer.
fn record_inference(state: &ApiState, model: &str, request: &Value, response: &Value) {
    let Some(batch) = &state.batch else {
        return;
    };

    let inference_id =
        base64::engine::general_purpose::STANDARD.encode(Uuid::new_v4().as_bytes());
    let prompt_payload = request.to_string();
    let prompt_hash = hex::encode(Sha256::digest(prompt_payload.as_bytes()));
    let response_payload = response.to_string();
    let response_hash = hex::encode(Sha256::digest(response_payload.as_bytes()));
    let request_timestamp = chrono::Utc::now().timestamp();

    let usage = &response["usage"];
    let prompt_tokens = usage["prompt_tokens"].as_u64().unwrap_or_default();
    let completion_tokens = usage["completion_tokens"].as_u64().unwrap_or_default();

    if let Err(err) = state.store.store_prompt_payload(&PromptPayload {
        inference_id: inference_id.clone(),
        prompt_payload: prompt_payload.clone(),
        prompt_hash: prompt_hash.clone(),
        model: model.to_owned(),
        request_timestamp,
        stored_by: state.participant.clone(),
    }) {
        warn!(%err, "cannot retain prompt payload");
    }

    let start = ChainMsg::StartInference {
        inference_id: inference_id.clone(),
        prompt_hash,
        prompt_payload,
        model: model.to_owned(),
        requested_by: state.participant.clone(),
        assigned_to: state.participant.clone(),
        node_version: String::new(),
        max_tokens: 0,
        prompt_token_count: prompt_tokens,
        request_timestamp,
    };
    let finish = ChainMsg::FinishInference {
        inference_id,
        response_hash,
        response_payload,
        prompt_token_count: prompt_tokens,
        completion_token_count: completion_tokens,
        executed_by: state.participant.clone(),
        transferred_by: state.participant.clone(),
        request_timestamp,
    };
    for msg in [start, finish] {
        if let Err(err) = batch.enqueue(msg) {
            warn!(%err, "cannot queue inference record");
        }
    }
}

async fn inference_payloads(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let payload = state
        .store
        .get_prompt_payload(&id)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(json!({
        "inference_id": payload.inference_id,
        "prompt_payload": payload.prompt_payload,
        "prompt_hash": payload.prompt_hash,
        "model": payload.model,
        "request_timestamp": payload.request_timestamp,
        "stored_by": payload.stored_by,
    })))
}
