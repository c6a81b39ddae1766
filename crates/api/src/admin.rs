//! Admin surface: node CRUD, enable/disable, hardware, status, export.

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use infernet_broker::NodeView;
use infernet_db::kv;
use infernet_primitives::{HardwareItem, NodeSpec};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{ApiError, ApiState};

pub fn admin_router(state: ApiState) -> Router {
    Router::new()
        .route("/admin/v1/nodes", get(list_nodes).post(register_node))
        .route("/admin/v1/nodes/:id", put(update_node).delete(remove_node))
        .route("/admin/v1/nodes/:id/enable", post(enable_node))
        .route("/admin/v1/nodes/:id/disable", post(disable_node))
        .route("/admin/v1/nodes/:id/hardware", put(update_hardware))
        .route("/admin/v1/nodes/:id/test", post(test_node))
        .route("/admin/v1/status", get(status))
        .route("/admin/v1/export", get(export))
        .with_state(state)
}

async fn list_nodes(State(state): State<ApiState>) -> Result<Json<Vec<NodeView>>, ApiError> {
    Ok(Json(state.broker.nodes().await?))
}

async fn register_node(
    State(state): State<ApiState>,
    Json(spec): Json<NodeSpec>,
) -> Result<Json<NodeView>, ApiError> {
    Ok(Json(state.broker.register_node(spec).await?))
}

async fn update_node(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(mut spec): Json<NodeSpec>,
) -> Result<Json<NodeView>, ApiError> {
    spec.id = id;
    Ok(Json(state.broker.update_node(spec).await?))
}

#[derive(Serialize)]
struct RemovedResponse {
    removed: bool,
}

async fn remove_node(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<RemovedResponse>, ApiError> {
    let removed = state.broker.remove_node(&id).await?;
    Ok(Json(RemovedResponse { removed }))
}

async fn enable_node(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    set_admin(&state, &id, true).await
}

async fn disable_node(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    set_admin(&state, &id, false).await
}

async fn set_admin(state: &ApiState, id: &str, enabled: bool) -> Result<Json<Value>, ApiError> {
    let epoch = state
        .phase_tracker
        .epoch_state()
        .map(|epoch_state| epoch_state.latest_epoch.epoch_index())
        .unwrap_or_default();
    let known = state.broker.set_admin_state(id, enabled, epoch).await?;
    if !known {
        return Err(ApiError::NotFound);
    }
    Ok(Json(json!({ "id": id, "enabled": enabled, "epoch": epoch })))
}

async fn update_hardware(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(hardware): Json<Vec<HardwareItem>>,
) -> Result<Json<Value>, ApiError> {
    let known = state.broker.update_hardware(&id, hardware.clone()).await?;
    if !known {
        return Err(ApiError::NotFound);
    }

    // The chain tracks hardware per node; report the change.
    if let Some(batch) = &state.batch {
        let diff = infernet_chain::ChainMsg::SubmitHardwareDiff {
            node_id: id.clone(),
            hardware,
        };
        if let Err(err) = batch.enqueue(diff) {
            tracing::warn!(node_id = %id, %err, "cannot queue hardware diff");
        }
    }
    Ok(Json(json!({ "id": id, "updated": true })))
}

/// Kicks a status re-query; the result lands asynchronously in node state.
async fn test_node(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.broker.query_node_status(&id).await;
    Ok(Json(json!({ "id": id, "triggered": true })))
}

async fn status(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let current_height: Option<u64> = state.store.kv_get(kv::CURRENT_HEIGHT)?;
    let upgrade_plan: Option<infernet_db::UpgradePlan> = state.store.kv_get(kv::UPGRADE_PLAN)?;
    let phase = state
        .phase_tracker
        .epoch_state()
        .map(|epoch_state| format!("{:?}", epoch_state.current_phase));
    Ok(Json(json!({
        "current_height": current_height,
        "upgrade_plan": upgrade_plan,
        "phase": phase,
    })))
}

/// Dumps dynamic state for support bundles.
async fn export(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let nodes = state.broker.nodes().await?;
    let keys = [
        kv::CURRENT_HEIGHT,
        kv::LAST_PROCESSED_HEIGHT,
        kv::SEED_CURRENT,
        kv::SEED_PREVIOUS,
        kv::SEED_UPCOMING,
        kv::VALIDATION_PARAMS,
        kv::BANDWIDTH_PARAMS,
        kv::CURRENT_NODE_VERSION,
    ];
    let mut kv_dump = serde_json::Map::new();
    for key in keys {
        if let Some(value) = state.store.kv_get::<Value>(key)? {
            kv_dump.insert(key.to_owned(), value);
        }
    }
    Ok(Json(json!({ "nodes": nodes, "kv": kv_dump })))
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc};

    use infernet_broker::{build_broker, BrokerConfig};
    use infernet_db::Store;
    use infernet_node_client::MockBatchHandler;
    use infernet_phase_tracker::PhaseTracker;
    use infernet_primitives::ModelConfig;

    use super::*;

    fn state() -> ApiState {
        let store = Store::open_in_memory().unwrap();
        let (broker, task) = build_broker(
            store.clone(),
            BrokerConfig::default(),
            Arc::new(MockBatchHandler::new()),
        );
        tokio::spawn(task);
        ApiState {
            broker,
            store,
            phase_tracker: Arc::new(PhaseTracker::new()),
            participant: "part1main".to_owned(),
            batch: None,
        }
    }

    fn spec(id: &str) -> NodeSpec {
        NodeSpec {
            id: id.to_owned(),
            base_url: Some("http://10.255.255.1:81".to_owned()),
            models: BTreeMap::from([("llama-3".to_owned(), ModelConfig::default())]),
            max_concurrent: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn register_then_list_roundtrip() {
        let state = state();
        let _ = register_node(State(state.clone()), Json(spec("n1")))
            .await
            .unwrap();

        let nodes = list_nodes(State(state)).await.unwrap();
        assert_eq!(nodes.0.len(), 1);
        assert_eq!(nodes.0[0].config.id, "n1");
    }

    #[tokio::test]
    async fn invalid_spec_maps_to_error() {
        let state = state();
        let mut bad = spec("n1");
        bad.models.clear();
        let err = register_node(State(state), Json(bad)).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Broker(infernet_broker::BrokerError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn unknown_node_disable_is_404() {
        let state = state();
        let err = disable_node(State(state), Path("ghost".to_owned()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[tokio::test]
    async fn remove_reports_flag() {
        let state = state();
        let _ = register_node(State(state.clone()), Json(spec("n1")))
            .await
            .unwrap();

        let first = remove_node(State(state.clone()), Path("n1".to_owned()))
            .await
            .unwrap();
        assert!(first.0.removed);

        let second = remove_node(State(state), Path("n1".to_owned()))
            .await
            .unwrap();
        assert!(!second.0.removed);
    }
}
