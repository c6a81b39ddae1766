//! WebSocket event listener and worker pools.

use std::{sync::Arc, time::Duration};

use infernet_block_observer::ObservedEvent;
use infernet_chain::{ChainWsEvent, EventSocket, TxEventData, SUBSCRIPTION_QUERIES};
use infernet_db::{kv, Store, UpgradePlan};
use infernet_validation::Validator;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::{classify_tx_event, BlockDispatcher, HeightGate, HeightGateHandle, TxAction};

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub ws_url: String,
    pub tx_workers: usize,
    pub block_queue: usize,
    pub tx_queue: usize,
    pub reconnect_delay: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            ws_url: String::new(),
            tx_workers: 4,
            block_queue: 64,
            tx_queue: 1024,
            reconnect_delay: Duration::from_secs(10),
        }
    }
}

/// Why the listener stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerExit {
    /// Shutdown was requested.
    Shutdown,
    /// The subscription broke and an upgrade is pending at or below the
    /// current height; the process should exit for the upgrade.
    UpgradePending,
}

/// Runs the subscription loop plus the block/tx worker pools until shutdown.
///
/// `observer_events` is the backfill queue from the block observer; its tx
/// events join the same worker pool and its barriers advance the height
/// gate.
#[expect(clippy::too_many_arguments, reason = "wired once at startup")]
pub async fn run_event_listener(
    config: ListenerConfig,
    dispatcher: BlockDispatcher,
    validator: Arc<Validator>,
    store: Store,
    observer_events: mpsc::UnboundedReceiver<ObservedEvent>,
    gate: HeightGate,
    gate_handle: HeightGateHandle,
    mut shutdown: watch::Receiver<bool>,
) -> ListenerExit {
    let (block_tx, block_rx) = mpsc::channel::<(u64, String, Option<chrono::DateTime<chrono::Utc>>)>(
        config.block_queue,
    );
    let (txev_tx, txev_rx) = mpsc::channel::<TxEventData>(config.tx_queue);

    let mut workers = Vec::new();

    // Serial block worker: heights must be processed in order.
    workers.push(tokio::spawn(block_worker(block_rx, dispatcher)));

    // Tx workers share one receiver.
    let txev_rx = Arc::new(Mutex::new(txev_rx));
    for worker_id in 0..config.tx_workers.max(1) {
        workers.push(tokio::spawn(tx_worker(
            worker_id,
            txev_rx.clone(),
            gate.clone(),
            validator.clone(),
        )));
    }

    // Bridge from the backfill observer into the same tx pool.
    workers.push(tokio::spawn(observer_bridge(
        observer_events,
        txev_tx.clone(),
        gate_handle.clone(),
    )));

    let exit = subscription_loop(
        &config,
        &store,
        &block_tx,
        &txev_tx,
        &gate_handle,
        &mut shutdown,
    )
    .await;

    for worker in &workers {
        worker.abort();
    }
    info!(?exit, "event listener stopped");
    exit
}

async fn subscription_loop(
    config: &ListenerConfig,
    store: &Store,
    block_tx: &mpsc::Sender<(u64, String, Option<chrono::DateTime<chrono::Utc>>)>,
    txev_tx: &mpsc::Sender<TxEventData>,
    gate_handle: &HeightGateHandle,
    shutdown: &mut watch::Receiver<bool>,
) -> ListenerExit {
    loop {
        if *shutdown.borrow() {
            return ListenerExit::Shutdown;
        }

        let mut socket = match EventSocket::connect(&config.ws_url, &SUBSCRIPTION_QUERIES).await {
            Ok(socket) => socket,
            Err(err) => {
                warn!(%err, url = %config.ws_url, "event subscription connect failed");
                if upgrade_pending(store, gate_handle.current()) {
                    return ListenerExit::UpgradePending;
                }
                if !sleep_or_shutdown(config.reconnect_delay, shutdown).await {
                    return ListenerExit::Shutdown;
                }
                continue;
            }
        };

        loop {
            let polled = tokio::select! {
                event = socket.next_event() => Some(event),
                _ = shutdown.changed() => None,
            };
            let Some(event) = polled else {
                if *shutdown.borrow() {
                    socket.close().await;
                    return ListenerExit::Shutdown;
                }
                continue;
            };

            match event {
                Ok(Some(ChainWsEvent::NewBlock { height, hash, time })) => {
                    if block_tx.try_send((height, hash, time)).is_err() {
                        warn!(height, "block queue full; dropping block event");
                    }
                }
                Ok(Some(ChainWsEvent::Tx(data))) => {
                    if txev_tx.try_send(data).is_err() {
                        warn!("tx queue full; dropping tx event");
                    }
                }
                Ok(None) => {
                    info!("event subscription closed by peer");
                    break;
                }
                Err(err) => {
                    error!(%err, "event subscription failed");
                    socket.close().await;
                    if upgrade_pending(store, gate_handle.current()) {
                        info!("upgrade pending; shutting down for the upgrade");
                        return ListenerExit::UpgradePending;
                    }
                    break;
                }
            }
        }

        if !sleep_or_shutdown(config.reconnect_delay, shutdown).await {
            return ListenerExit::Shutdown;
        }
    }
}

/// True while the shutdown flag stayed false through the sleep.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.changed() => !*shutdown.borrow(),
    }
}

/// An upgrade counts as pending once its height is reached.
fn upgrade_pending(store: &Store, current_height: u64) -> bool {
    match store.kv_get::<UpgradePlan>(kv::UPGRADE_PLAN) {
        Ok(Some(plan)) => plan.height <= current_height,
        Ok(None) => false,
        Err(err) => {
            error!(%err, "cannot read upgrade plan");
            false
        }
    }
}

async fn block_worker(
    mut block_rx: mpsc::Receiver<(u64, String, Option<chrono::DateTime<chrono::Utc>>)>,
    mut dispatcher: BlockDispatcher,
) {
    while let Some((height, hash, time)) = block_rx.recv().await {
        if let Err(err) = dispatcher.on_new_block(height, hash, time).await {
            error!(height, %err, "block dispatch failed");
        }
    }
}

async fn tx_worker(
    worker_id: usize,
    txev_rx: Arc<Mutex<mpsc::Receiver<TxEventData>>>,
    mut gate: HeightGate,
    validator: Arc<Validator>,
) {
    loop {
        let event = {
            let mut rx = txev_rx.lock().await;
            rx.recv().await
        };
        let Some(event) = event else {
            return;
        };

        // Handlers must observe local state at or past the event's height.
        if !gate.wait_for(event.height).await {
            return;
        }

        for action in classify_tx_event(&event) {
            match action {
                TxAction::ValidateInference { inference_id } => {
                    if let Err(err) = validator.maybe_validate(&inference_id, false).await {
                        warn!(worker_id, %inference_id, %err, "validation failed");
                    }
                }
                TxAction::Revalidate { inference_id } => {
                    if let Err(err) = validator.maybe_validate(&inference_id, true).await {
                        warn!(worker_id, %inference_id, %err, "revalidation failed");
                    }
                }
                TxAction::TrainingAssigned { task_id } => {
                    // Training execution is handled by the training
                    // subsystem; the control plane only records assignment.
                    info!(%task_id, "training task assigned");
                }
                TxAction::ProposalSubmitted { proposal_id } => {
                    info!(%proposal_id, "governance proposal observed");
                }
                TxAction::Bls => {
                    debug!(height = event.height, "bls event routed");
                }
            }
        }
    }
}

async fn observer_bridge(
    mut observer_events: mpsc::UnboundedReceiver<ObservedEvent>,
    txev_tx: mpsc::Sender<TxEventData>,
    gate_handle: HeightGateHandle,
) {
    while let Some(event) = observer_events.recv().await {
        match event {
            ObservedEvent::Tx(data) => {
                if txev_tx.try_send(data).is_err() {
                    warn!("tx queue full; dropping backfilled event");
                }
            }
            ObservedEvent::Barrier { height } => {
                // A completed backfill height unblocks gated handlers.
                gate_handle.advance(height);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_is_pending_only_at_its_height() {
        let store = Store::open_in_memory().unwrap();
        assert!(!upgrade_pending(&store, 100));

        store
            .kv_put(
                kv::UPGRADE_PLAN,
                &UpgradePlan {
                    name: "v2".to_owned(),
                    height: 150,
                },
            )
            .unwrap();
        assert!(!upgrade_pending(&store, 100));
        assert!(upgrade_pending(&store, 150));
        assert!(upgrade_pending(&store, 151));
    }
}
