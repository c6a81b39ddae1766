use std::{sync::Arc, time::Duration};

use infernet_chain::{
    classify_broadcast, BroadcastClass, BroadcastResponse, Broadcaster, ChainMsg, TxLookup,
};
use infernet_chain_tracker::ChainTracker;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    stream::DurableStream,
    handlers::Verdict,
    TxEnvelope, TxError,
};

#[derive(Debug, Clone)]
pub struct TxManagerConfig {
    /// Validity window stamped on each broadcast, added to the latest block
    /// time.
    pub tx_validity: Duration,
    /// Sleep before retrying while the chain is halted or a transport
    /// failure is in play.
    pub halt_retry: Duration,
    /// Poll cadence for not-yet-included txs on the observe stream.
    pub observe_poll: Duration,
    /// Idle wait when a stream is empty.
    pub idle_poll: Duration,
}

impl Default for TxManagerConfig {
    fn default() -> Self {
        Self {
            tx_validity: Duration::from_secs(60),
            halt_retry: Duration::from_secs(5),
            observe_poll: Duration::from_secs(2),
            idle_poll: Duration::from_millis(200),
        }
    }
}

pub(crate) struct TxManagerInner {
    pub(crate) broadcaster: Arc<dyn Broadcaster>,
    pub(crate) tracker: Arc<ChainTracker>,
    pub(crate) send: DurableStream,
    pub(crate) observe: DurableStream,
    pub(crate) config: TxManagerConfig,
}

impl TxManagerInner {
    pub(crate) fn latest_block_time_ns(&self) -> Option<u64> {
        self.tracker
            .latest_block_time()
            .and_then(|time| time.timestamp_nanos_opt())
            .map(|ns| ns as u64)
    }

    /// Expiry for a tx broadcast now.
    pub(crate) fn next_timeout_ns(&self) -> Option<u64> {
        self.latest_block_time_ns()
            .map(|ns| ns + self.config.tx_validity.as_nanos() as u64)
    }
}

/// Handle to the outbox. Cheap to clone.
#[derive(Clone)]
pub struct TxManager {
    inner: Arc<TxManagerInner>,
}

impl TxManager {
    pub fn open(
        db: &sled::Db,
        broadcaster: Arc<dyn Broadcaster>,
        tracker: Arc<ChainTracker>,
        config: TxManagerConfig,
    ) -> Result<Self, TxError> {
        let inner = TxManagerInner {
            broadcaster,
            tracker,
            send: DurableStream::open(db, "txmgr_send")?,
            observe: DurableStream::open(db, "txmgr_observe")?,
            config,
        };
        info!(
            pending_send = inner.send.len(),
            pending_observe = inner.observe.len(),
            "tx outbox opened"
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Parks a message on the durable send stream without broadcasting.
    pub fn queue(&self, msg: ChainMsg) -> Result<(), TxError> {
        self.inner.send.push(&TxEnvelope::new(vec![msg]))
    }

    /// Broadcasts now; on retryable failure the message is parked on the
    /// send stream for the background consumer.
    pub async fn send_transaction_async_with_retry(
        &self,
        msg: ChainMsg,
    ) -> Result<BroadcastResponse, TxError> {
        let envelope = TxEnvelope::new(vec![msg]);
        let Some(timeout_ns) = self.inner.next_timeout_ns() else {
            self.inner.send.push(&envelope)?;
            return Err(TxError::FailedQueuedForRetry);
        };

        match self
            .inner
            .broadcaster
            .broadcast(envelope.msgs.clone(), timeout_ns)
            .await
        {
            Err(err) => {
                warn!(%err, "broadcast failed; queueing for retry");
                self.inner.send.push(&envelope)?;
                Err(TxError::FailedQueuedForRetry)
            }
            Ok(response) => match classify_broadcast(response.code, &response.log) {
                BroadcastClass::Critical => Err(TxError::Critical(response.log)),
                BroadcastClass::Retryable => {
                    self.inner.send.push(&envelope)?;
                    Err(TxError::FailedQueuedForRetry)
                }
                BroadcastClass::Accepted => {
                    let mut observed = envelope;
                    observed.sent = true;
                    observed.tx_hash = response.tx_hash.clone();
                    observed.timeout_ns = timeout_ns;
                    self.inner.observe.push(&observed)?;
                    Ok(response)
                }
            },
        }
    }

    /// Fire-and-report: no durable retry.
    pub async fn send_transaction_async_no_retry(
        &self,
        msg: ChainMsg,
    ) -> Result<BroadcastResponse, TxError> {
        let timeout_ns = self
            .inner
            .next_timeout_ns()
            .ok_or(TxError::FailedQueuedForRetry)?;
        let response = self.inner.broadcaster.broadcast(vec![msg], timeout_ns).await?;
        match classify_broadcast(response.code, &response.log) {
            BroadcastClass::Critical => Err(TxError::Critical(response.log)),
            _ => Ok(response),
        }
    }

    /// Broadcasts and blocks until inclusion, up to the broadcaster's wait
    /// window.
    pub async fn send_transaction_sync_no_retry(&self, msg: ChainMsg) -> Result<TxLookup, TxError> {
        let response = self.send_transaction_async_no_retry(msg).await?;
        self.inner
            .broadcaster
            .wait_for_inclusion(response.tx_hash)
            .await?
            .ok_or(TxError::InclusionTimeout)
    }

    /// Number of envelopes waiting to broadcast. Mostly for tests/metrics.
    pub fn pending_send(&self) -> usize {
        self.inner.send.len()
    }

    pub fn pending_observe(&self) -> usize {
        self.inner.observe.len()
    }

    pub(crate) fn inner(&self) -> &Arc<TxManagerInner> {
        &self.inner
    }

    /// Runs the send and observe consumers until shutdown flips to true.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let send_loop = consume_send(self.inner.clone(), shutdown.clone());
        let observe_loop = consume_observe(self.inner.clone(), shutdown);
        tokio::join!(send_loop, observe_loop);
        info!("tx outbox consumers stopped");
    }
}

async fn consume_send(inner: Arc<TxManagerInner>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        match inner.send.first() {
            Ok(Some((key, envelope))) => {
                let verdict = inner.handle_send(envelope).await;
                apply_verdict(&inner.send, &key, verdict, &mut shutdown).await;
            }
            Ok(None) => idle(&inner.send, inner.config.idle_poll, &mut shutdown).await,
            Err(err) => {
                error!(%err, "send stream read failed");
                tokio::time::sleep(inner.config.halt_retry).await;
            }
        }
    }
}

async fn consume_observe(inner: Arc<TxManagerInner>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        match inner.observe.first() {
            Ok(Some((key, envelope))) => {
                let verdict = inner.handle_observe(envelope).await;
                apply_verdict(&inner.observe, &key, verdict, &mut shutdown).await;
            }
            Ok(None) => idle(&inner.observe, inner.config.idle_poll, &mut shutdown).await,
            Err(err) => {
                error!(%err, "observe stream read failed");
                tokio::time::sleep(inner.config.halt_retry).await;
            }
        }
    }
}

async fn apply_verdict(
    stream: &DurableStream,
    key: &sled::IVec,
    verdict: Verdict,
    shutdown: &mut watch::Receiver<bool>,
) {
    match verdict {
        Verdict::Acknowledge => {
            if let Err(err) = stream.remove(key) {
                error!(%err, "cannot ack stream entry");
            }
        }
        Verdict::Terminate(reason) => {
            warn!(%reason, "dropping outbox envelope");
            if let Err(err) = stream.remove(key) {
                error!(%err, "cannot drop stream entry");
            }
        }
        Verdict::Redeliver(delay) => {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {}
            }
        }
    }
}

async fn idle(stream: &DurableStream, poll: Duration, shutdown: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = stream.wait_for_item() => {}
        _ = tokio::time::sleep(poll) => {}
        _ = shutdown.changed() => {}
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use infernet_chain::{ChainError, MockBroadcaster};

    use super::*;

    fn block_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_000, 0).unwrap()
    }

    fn tracker_with_block() -> Arc<ChainTracker> {
        let tracker = ChainTracker::new(Duration::from_secs(600));
        tracker.observe(100, block_time());
        Arc::new(tracker)
    }

    fn manager(broadcaster: MockBroadcaster, tracker: Arc<ChainTracker>) -> (tempfile::TempDir, TxManager) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let mgr = TxManager::open(
            &db,
            Arc::new(broadcaster),
            tracker,
            TxManagerConfig::default(),
        )
        .unwrap();
        (dir, mgr)
    }

    fn seed_msg() -> ChainMsg {
        ChainMsg::SubmitSeed {
            epoch_index: 9,
            signature: "aa".into(),
        }
    }

    fn accepted(hash: &str) -> BroadcastResponse {
        BroadcastResponse {
            code: 0,
            log: String::new(),
            tx_hash: hash.to_owned(),
        }
    }

    #[tokio::test]
    async fn with_retry_moves_accepted_tx_to_observe() {
        let mut broadcaster = MockBroadcaster::new();
        broadcaster
            .expect_broadcast()
            .times(1)
            .returning(|_, _| Ok(accepted("AB12")));

        let (_dir, mgr) = manager(broadcaster, tracker_with_block());
        let response = mgr.send_transaction_async_with_retry(seed_msg()).await.unwrap();

        assert_eq!(response.tx_hash, "AB12");
        assert_eq!(mgr.pending_send(), 0);
        assert_eq!(mgr.pending_observe(), 1);
    }

    #[tokio::test]
    async fn with_retry_parks_retryable_failures() {
        let mut broadcaster = MockBroadcaster::new();
        broadcaster.expect_broadcast().returning(|_, _| {
            Ok(BroadcastResponse {
                code: 19,
                log: "tx already exists in cache".into(),
                tx_hash: String::new(),
            })
        });

        let (_dir, mgr) = manager(broadcaster, tracker_with_block());
        let err = mgr
            .send_transaction_async_with_retry(seed_msg())
            .await
            .unwrap_err();

        assert!(matches!(err, TxError::FailedQueuedForRetry));
        assert_eq!(mgr.pending_send(), 1);
        assert_eq!(mgr.pending_observe(), 0);
    }

    #[tokio::test]
    async fn with_retry_drops_critical_failures() {
        let mut broadcaster = MockBroadcaster::new();
        broadcaster.expect_broadcast().returning(|_, _| {
            Ok(BroadcastResponse {
                code: 32,
                log: "account sequence mismatch".into(),
                tx_hash: String::new(),
            })
        });

        let (_dir, mgr) = manager(broadcaster, tracker_with_block());
        let err = mgr
            .send_transaction_async_with_retry(seed_msg())
            .await
            .unwrap_err();

        assert!(matches!(err, TxError::Critical(_)));
        assert_eq!(mgr.pending_send(), 0);
        assert_eq!(mgr.pending_observe(), 0);
    }

    #[tokio::test]
    async fn send_handler_redelivers_while_unstamped() {
        // tracker that never saw a block: cannot compute a timeout
        let tracker = Arc::new(ChainTracker::new(Duration::from_secs(600)));
        let (_dir, mgr) = manager(MockBroadcaster::new(), tracker);

        let verdict = mgr.inner().handle_send(TxEnvelope::new(vec![seed_msg()])).await;
        assert!(matches!(verdict, Verdict::Redeliver(_)));
    }

    #[tokio::test]
    async fn observe_expiry_requeues_to_send() {
        let mut broadcaster = MockBroadcaster::new();
        broadcaster.expect_query_tx().returning(|_| Ok(None));

        let (_dir, mgr) = manager(broadcaster, tracker_with_block());

        let mut envelope = TxEnvelope::new(vec![seed_msg()]);
        envelope.sent = true;
        envelope.tx_hash = "AB12".into();
        // expired long before the tracked block time
        envelope.timeout_ns = 1;

        let verdict = mgr.inner().handle_observe(envelope).await;
        assert_eq!(verdict, Verdict::Acknowledge);
        assert_eq!(mgr.pending_send(), 1);

        let (_, requeued) = mgr.inner().send.first().unwrap().unwrap();
        assert_eq!(requeued.attempts, 1);
        assert!(!requeued.sent);
        assert!(requeued.tx_hash.is_empty());
    }

    #[tokio::test]
    async fn observe_redelivers_before_expiry() {
        let mut broadcaster = MockBroadcaster::new();
        broadcaster.expect_query_tx().returning(|_| Ok(None));

        let (_dir, mgr) = manager(broadcaster, tracker_with_block());

        let mut envelope = TxEnvelope::new(vec![seed_msg()]);
        envelope.sent = true;
        envelope.tx_hash = "AB12".into();
        envelope.timeout_ns = u64::MAX;

        let verdict = mgr.inner().handle_observe(envelope).await;
        assert!(matches!(verdict, Verdict::Redeliver(_)));
    }

    #[tokio::test]
    async fn observe_terminates_on_decode_error() {
        let mut broadcaster = MockBroadcaster::new();
        broadcaster
            .expect_query_tx()
            .returning(|_| Err(ChainError::Decode("garbage".into())));

        let (_dir, mgr) = manager(broadcaster, tracker_with_block());

        let mut envelope = TxEnvelope::new(vec![seed_msg()]);
        envelope.sent = true;
        envelope.tx_hash = "AB12".into();

        let verdict = mgr.inner().handle_observe(envelope).await;
        assert!(matches!(verdict, Verdict::Terminate(_)));
    }

    #[tokio::test]
    async fn missing_hash_counts_an_attempt() {
        let (_dir, mgr) = manager(MockBroadcaster::new(), tracker_with_block());

        let mut envelope = TxEnvelope::new(vec![seed_msg()]);
        envelope.sent = true; // broadcast claimed, but hash never recorded

        let verdict = mgr.inner().handle_observe(envelope).await;
        assert_eq!(verdict, Verdict::Acknowledge);
        assert_eq!(mgr.pending_send(), 1);
    }

    #[tokio::test]
    async fn exhausted_envelope_terminates() {
        let (_dir, mgr) = manager(MockBroadcaster::new(), tracker_with_block());

        let mut envelope = TxEnvelope::new(vec![seed_msg()]);
        envelope.sent = true;
        envelope.attempts = crate::MAX_ATTEMPTS - 1;

        let verdict = mgr.inner().handle_observe(envelope).await;
        assert!(matches!(verdict, Verdict::Terminate(_)));
        assert_eq!(mgr.pending_send(), 0);
    }
}
