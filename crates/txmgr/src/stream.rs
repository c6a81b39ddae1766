//! Persistent FIFO streams over sled trees.

use std::sync::Arc;

use sled::IVec;
use tokio::sync::Notify;

use crate::{TxEnvelope, TxError};

/// Append-only queue with monotonically increasing keys. One consumer.
#[derive(Debug, Clone)]
pub(crate) struct DurableStream {
    db: sled::Db,
    tree: sled::Tree,
    notify: Arc<Notify>,
}

impl DurableStream {
    pub(crate) fn open(db: &sled::Db, name: &str) -> Result<Self, TxError> {
        Ok(Self {
            db: db.clone(),
            tree: db.open_tree(name)?,
            notify: Arc::new(Notify::new()),
        })
    }

    pub(crate) fn push(&self, envelope: &TxEnvelope) -> Result<(), TxError> {
        let key = self.db.generate_id()?.to_be_bytes();
        let value = serde_json::to_vec(envelope)?;
        self.tree.insert(key, value)?;
        self.notify.notify_one();
        Ok(())
    }

    /// Head of the queue, if any.
    pub(crate) fn first(&self) -> Result<Option<(IVec, TxEnvelope)>, TxError> {
        let Some((key, value)) = self.tree.first()? else {
            return Ok(None);
        };
        Ok(Some((key, serde_json::from_slice(&value)?)))
    }

    pub(crate) fn remove(&self, key: &IVec) -> Result<(), TxError> {
        self.tree.remove(key)?;
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.tree.len()
    }

    /// Waits until a push likely happened. Used to idle without polling hot.
    pub(crate) async fn wait_for_item(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use infernet_chain::ChainMsg;

    use super::*;

    fn stream() -> (tempfile::TempDir, DurableStream) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let stream = DurableStream::open(&db, "test").unwrap();
        (dir, stream)
    }

    fn envelope(epoch: u64) -> TxEnvelope {
        TxEnvelope::new(vec![ChainMsg::SubmitSeed {
            epoch_index: epoch,
            signature: String::new(),
        }])
    }

    #[test]
    fn fifo_order_is_preserved() {
        let (_dir, stream) = stream();
        let first = envelope(1);
        let second = envelope(2);
        stream.push(&first).unwrap();
        stream.push(&second).unwrap();

        let (key, head) = stream.first().unwrap().unwrap();
        assert_eq!(head.id, first.id);
        stream.remove(&key).unwrap();

        let (_, head) = stream.first().unwrap().unwrap();
        assert_eq!(head.id, second.id);
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let env = envelope(9);
        {
            let db = sled::open(dir.path()).unwrap();
            let stream = DurableStream::open(&db, "s").unwrap();
            stream.push(&env).unwrap();
        }
        let db = sled::open(dir.path()).unwrap();
        let stream = DurableStream::open(&db, "s").unwrap();
        assert_eq!(stream.first().unwrap().unwrap().1.id, env.id);
    }
}
