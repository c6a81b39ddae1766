use std::{future::Future, sync::Arc};

use infernet_chain::{ChainReader, TxEventData};
use infernet_db::{kv, Store};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

/// Tip status the observer reacts to. The watch channel coalesces redundant
/// updates, so equal statuses cause no extra wake-ups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObserverStatus {
    pub current_height: u64,
    pub is_caught_up: bool,
}

/// One item on the observer's output queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    Tx(TxEventData),
    /// Emitted after the last tx of a height; lets consumers detect height
    /// completion.
    Barrier { height: u64 },
}

/// Creates the observer task plus the unbounded event queue it feeds.
pub fn build_block_observer<R: ChainReader + 'static>(
    store: Store,
    reader: Arc<R>,
    status_rx: watch::Receiver<ObserverStatus>,
) -> (mpsc::UnboundedReceiver<ObservedEvent>, impl Future<Output = ()>) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let task = block_observer_task(store, reader, status_rx, event_tx);
    (event_rx, task)
}

async fn block_observer_task<R: ChainReader>(
    store: Store,
    reader: Arc<R>,
    mut status_rx: watch::Receiver<ObserverStatus>,
    event_tx: mpsc::UnboundedSender<ObservedEvent>,
) {
    loop {
        let status = *status_rx.borrow_and_update();
        if status.is_caught_up {
            if let Err(err) = catch_up(&store, reader.as_ref(), &event_tx, status).await {
                error!(%err, "block observer backfill failed; will retry on next status");
            }
        }

        if status_rx.changed().await.is_err() {
            warn!("observer status channel closed; shutting down");
            return;
        }
    }
}

/// Processes every missing height in order. Aborts on the first RPC failure
/// without advancing past it.
async fn catch_up<R: ChainReader>(
    store: &Store,
    reader: &R,
    event_tx: &mpsc::UnboundedSender<ObservedEvent>,
    status: ObserverStatus,
) -> eyre::Result<()> {
    let Some(mut last_processed) = store.kv_get::<u64>(kv::LAST_PROCESSED_HEIGHT)? else {
        // First run: start from the live tip instead of replaying history.
        store.kv_put(kv::LAST_PROCESSED_HEIGHT, &status.current_height)?;
        return Ok(());
    };

    while last_processed < status.current_height {
        let height = last_processed + 1;
        let results = reader.block_results(height).await?;

        for tx in &results.txs_results {
            let data = TxEventData::from_events(height, &tx.events);
            event_tx
                .send(ObservedEvent::Tx(data))
                .map_err(|_| eyre::eyre!("event queue closed"))?;
        }
        event_tx
            .send(ObservedEvent::Barrier { height })
            .map_err(|_| eyre::eyre!("event queue closed"))?;

        // Only advance once every event of the height is enqueued.
        store.kv_put(kv::LAST_PROCESSED_HEIGHT, &height)?;
        last_processed = height;
        debug!(height, txs = results.txs_results.len(), "backfilled height");
    }

    Ok(())
}
