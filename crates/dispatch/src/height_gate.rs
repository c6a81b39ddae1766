//! Condition-variable-style gate on the locally processed height.
//!
//! Tx handlers must not run before the block worker has caught up to the
//! event's height; a watch channel replaces the old poll loop.

use tokio::sync::watch;

/// Writer side, owned by the block worker.
#[derive(Debug, Clone)]
pub struct HeightGateHandle {
    tx: watch::Sender<u64>,
}

impl HeightGateHandle {
    /// Advances the processed height. Regressions are ignored.
    pub fn advance(&self, height: u64) {
        self.tx.send_if_modified(|current| {
            if height > *current {
                *current = height;
                true
            } else {
                false
            }
        });
    }

    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }
}

/// Reader side, cloned into every tx worker.
#[derive(Debug, Clone)]
pub struct HeightGate {
    rx: watch::Receiver<u64>,
}

impl HeightGate {
    /// Blocks until the processed height reaches `height`. Returns false if
    /// the writer is gone.
    pub async fn wait_for(&mut self, height: u64) -> bool {
        self.rx.wait_for(|current| *current >= height).await.is_ok()
    }
}

pub fn height_gate_pair(initial: u64) -> (HeightGateHandle, HeightGate) {
    let (tx, rx) = watch::channel(initial);
    (HeightGateHandle { tx }, HeightGate { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn waits_until_height_reached() {
        let (handle, mut gate) = height_gate_pair(5);

        assert!(gate.wait_for(5).await);

        let waiter = tokio::spawn({
            let mut gate = gate.clone();
            async move { gate.wait_for(8).await }
        });

        handle.advance(6);
        handle.advance(8);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn regressions_do_not_move_the_gate() {
        let (handle, mut gate) = height_gate_pair(10);
        handle.advance(3);
        assert_eq!(handle.current(), 10);
        assert!(gate.wait_for(10).await);
    }
}
