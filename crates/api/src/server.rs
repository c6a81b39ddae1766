use std::sync::Arc;

use axum::Router;
use infernet_broker::BrokerHandle;
use infernet_db::Store;
use infernet_phase_tracker::PhaseTracker;
use tokio::sync::watch;
use tracing::info;

/// Shared state of both HTTP surfaces.
#[derive(Clone)]
pub struct ApiState {
    pub broker: BrokerHandle,
    pub store: Store,
    pub phase_tracker: Arc<PhaseTracker>,
    /// Participant address inferences are recorded under.
    pub participant: String,
    /// Outbox batch queue for start/finish inference records. `None` keeps
    /// the surface read-only (tests, tooling).
    pub batch: Option<infernet_txmgr::BatchSender>,
}

/// Serves `router` on `addr` until the shutdown flag flips.
pub async fn run_server(
    addr: &str,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "http server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}
