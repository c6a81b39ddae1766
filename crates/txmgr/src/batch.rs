//! Batch consumer for high-volume inference messages.
//!
//! Messages are parked on per-subject durable queues and flushed as one
//! composite broadcast when either the size threshold is reached or the
//! flush timeout elapses, whichever comes first. Duplicates within a flush
//! collapse by `dedup_key`, so re-submitting the same inference twice yields
//! a single on-chain inclusion.

use std::{
    collections::{hash_map::Entry, HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use infernet_chain::ChainMsg;
use parking_lot::Mutex;
use tokio::{sync::watch, time::Instant};
use tracing::{debug, error, warn};

use crate::{stream::DurableStream, TxEnvelope, TxError, TxManager};

const FLUSH_SCAN: Duration = Duration::from_millis(250);

struct SubjectQueue {
    stream: DurableStream,
    oldest_enqueue: Option<Instant>,
}

struct BatchInner {
    db: sled::Db,
    manager: TxManager,
    flush_size: usize,
    flush_timeout: Duration,
    subjects: Mutex<HashMap<&'static str, SubjectQueue>>,
}

/// Handle for enqueueing batched messages.
#[derive(Clone)]
pub struct BatchSender {
    inner: Arc<BatchInner>,
}

impl BatchSender {
    pub fn open(
        db: &sled::Db,
        manager: TxManager,
        flush_size: usize,
        flush_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(BatchInner {
                db: db.clone(),
                manager,
                flush_size,
                flush_timeout,
                subjects: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Parks a message on its subject queue. Messages without a batch
    /// subject go straight to the outbox send stream.
    pub fn enqueue(&self, msg: ChainMsg) -> Result<(), TxError> {
        let Some(subject) = msg.batch_subject() else {
            return self.inner.manager.queue(msg);
        };

        let mut subjects = self.inner.subjects.lock();
        let queue = match subjects.entry(subject) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let stream =
                    DurableStream::open(&self.inner.db, &format!("txmgr_batch_{subject}"))?;
                entry.insert(SubjectQueue {
                    stream,
                    oldest_enqueue: None,
                })
            }
        };

        queue.stream.push(&TxEnvelope::new(vec![msg]))?;
        queue.oldest_enqueue.get_or_insert_with(Instant::now);
        Ok(())
    }

    fn due_subjects(&self) -> Vec<&'static str> {
        let subjects = self.inner.subjects.lock();
        subjects
            .iter()
            .filter(|(_, queue)| {
                let len = queue.stream.len();
                len >= self.inner.flush_size
                    || (len > 0
                        && queue
                            .oldest_enqueue
                            .is_some_and(|at| at.elapsed() >= self.inner.flush_timeout))
            })
            .map(|(subject, _)| *subject)
            .collect()
    }

    /// Drains one subject into a single composite envelope on the outbox.
    fn flush_subject(&self, subject: &'static str) -> Result<usize, TxError> {
        let stream = {
            let mut subjects = self.inner.subjects.lock();
            let Some(queue) = subjects.get_mut(subject) else {
                return Ok(0);
            };
            queue.oldest_enqueue = None;
            queue.stream.clone()
        };

        let mut seen = HashSet::new();
        let mut msgs = Vec::new();
        while msgs.len() < self.inner.flush_size {
            let Some((key, envelope)) = stream.first()? else {
                break;
            };
            stream.remove(&key)?;
            for msg in envelope.msgs {
                let fresh = msg
                    .dedup_key()
                    .map(|dedup| seen.insert(dedup))
                    .unwrap_or(true);
                if fresh {
                    msgs.push(msg);
                } else {
                    debug!(subject, "dropped duplicate message in batch");
                }
            }
        }

        if msgs.is_empty() {
            return Ok(0);
        }

        let count = msgs.len();
        let composite = TxEnvelope::new(msgs);
        self.inner.manager.inner().send.push(&composite)?;
        debug!(subject, count, "flushed batch to outbox");
        Ok(count)
    }

    /// Flushes everything currently due. Exposed for tests and shutdown.
    pub fn flush_due(&self) {
        for subject in self.due_subjects() {
            if let Err(err) = self.flush_subject(subject) {
                error!(subject, %err, "batch flush failed");
            }
        }
    }

    /// Periodic flusher; runs until shutdown flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                // Final drain so a clean shutdown loses nothing in memory
                // (the queues themselves are durable either way).
                self.flush_due();
                return;
            }
            self.flush_due();
            tokio::select! {
                _ = tokio::time::sleep(FLUSH_SCAN) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("shutdown channel closed; stopping batch flusher");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use infernet_chain::MockBroadcaster;
    use infernet_chain_tracker::ChainTracker;

    use super::*;
    use crate::TxManagerConfig;

    fn start_msg(id: &str) -> ChainMsg {
        ChainMsg::StartInference {
            inference_id: id.to_owned(),
            prompt_hash: String::new(),
            prompt_payload: String::new(),
            model: "llama-3".into(),
            requested_by: String::new(),
            assigned_to: String::new(),
            node_version: String::new(),
            max_tokens: 0,
            prompt_token_count: 0,
            request_timestamp: 0,
        }
    }

    fn sender(flush_size: usize, flush_timeout: Duration) -> (tempfile::TempDir, BatchSender, TxManager) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let tracker = Arc::new(ChainTracker::new(Duration::from_secs(600)));
        let manager = TxManager::open(
            &db,
            Arc::new(MockBroadcaster::new()),
            tracker,
            TxManagerConfig::default(),
        )
        .unwrap();
        let sender = BatchSender::open(&db, manager.clone(), flush_size, flush_timeout);
        (dir, sender, manager)
    }

    #[test]
    fn size_threshold_triggers_flush() {
        let (_dir, sender, manager) = sender(2, Duration::from_secs(3600));

        sender.enqueue(start_msg("a")).unwrap();
        sender.flush_due();
        assert_eq!(manager.pending_send(), 0);

        sender.enqueue(start_msg("b")).unwrap();
        sender.flush_due();
        assert_eq!(manager.pending_send(), 1);

        let (_, composite) = manager.inner().send.first().unwrap().unwrap();
        assert_eq!(composite.msgs.len(), 2);
    }

    #[test]
    fn duplicates_collapse_within_a_flush() {
        let (_dir, sender, manager) = sender(3, Duration::from_secs(3600));

        sender.enqueue(start_msg("same")).unwrap();
        sender.enqueue(start_msg("same")).unwrap();
        sender.enqueue(start_msg("other")).unwrap();
        sender.flush_due();

        let (_, composite) = manager.inner().send.first().unwrap().unwrap();
        assert_eq!(composite.msgs.len(), 2);
    }

    #[test]
    fn timeout_flushes_partial_batch() {
        let (_dir, sender, manager) = sender(100, Duration::from_millis(0));

        sender.enqueue(start_msg("a")).unwrap();
        sender.flush_due();
        assert_eq!(manager.pending_send(), 1);
    }

    #[test]
    fn unbatched_messages_bypass_subjects() {
        let (_dir, sender, manager) = sender(100, Duration::from_secs(3600));

        sender
            .enqueue(ChainMsg::SubmitSeed {
                epoch_index: 1,
                signature: String::new(),
            })
            .unwrap();
        assert_eq!(manager.pending_send(), 1);
    }
}
