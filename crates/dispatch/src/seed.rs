//! Per-epoch seed lifecycle: generate, submit, rotate, claim.

use infernet_chain::{ChainMsg, Signer};
use infernet_db::{SeedSlot, Store};
use infernet_primitives::SeedInfo;
use infernet_txmgr::{TxError, TxManager};
use rand::RngCore;
use tracing::{debug, info};

pub struct SeedManager {
    store: Store,
    signer: Signer,
    txmgr: TxManager,
}

impl SeedManager {
    pub fn new(store: Store, signer: Signer, txmgr: TxManager) -> Self {
        Self {
            store,
            signer,
            txmgr,
        }
    }

    /// Generates a fresh 63-bit seed for `epoch_index`, stores it in the
    /// upcoming slot, and submits the signed seed on-chain. A seed already
    /// stored for the epoch is re-submitted rather than replaced.
    pub async fn generate_and_submit(&self, epoch_index: u64) -> Result<SeedInfo, TxError> {
        let seed = match self.store.seed(SeedSlot::Upcoming) {
            Ok(Some(existing)) if existing.epoch_index == epoch_index => {
                debug!(epoch_index, "reusing already generated upcoming seed");
                existing
            }
            _ => {
                let value = (rand::rngs::OsRng.next_u64() >> 1) as i64;
                let signature = self.signer.sign_seed(value);
                let seed = SeedInfo::new(value, epoch_index, signature);
                self.store
                    .set_seed(SeedSlot::Upcoming, &seed)
                    .map_err(|e| TxError::Critical(e.to_string()))?;
                info!(epoch_index, "generated upcoming epoch seed");
                seed
            }
        };

        let msg = ChainMsg::SubmitSeed {
            epoch_index,
            signature: seed.signature.clone(),
        };
        match self.txmgr.send_transaction_async_with_retry(msg).await {
            Ok(_) | Err(TxError::FailedQueuedForRetry) => Ok(seed),
            Err(err) => Err(err),
        }
    }

    /// Atomic three-slot rotation at the set-new-validators stage.
    pub fn rotate(&self) -> Result<(), TxError> {
        self.store
            .rotate_seeds()
            .map_err(|e| TxError::Critical(e.to_string()))?;
        info!("seed slots rotated");
        Ok(())
    }

    /// Claims the previous epoch's rewards once per seed.
    pub async fn claim_previous(&self) -> Result<(), TxError> {
        let previous = self
            .store
            .seed(SeedSlot::Previous)
            .map_err(|e| TxError::Critical(e.to_string()))?;
        let Some(previous) = previous else {
            return Ok(());
        };
        if previous.claimed {
            return Ok(());
        }

        let msg = ChainMsg::ClaimRewards {
            seed: previous.seed,
            epoch_index: previous.epoch_index,
        };
        match self.txmgr.send_transaction_async_with_retry(msg).await {
            Ok(_) | Err(TxError::FailedQueuedForRetry) => {}
            Err(err) => return Err(err),
        }
        self.store
            .mark_seed_claimed(previous.epoch_index)
            .map_err(|e| TxError::Critical(e.to_string()))?;
        info!(epoch_index = previous.epoch_index, "previous epoch rewards claimed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use infernet_chain::{BroadcastResponse, MockBroadcaster};
    use infernet_chain_tracker::ChainTracker;
    use infernet_txmgr::TxManagerConfig;
    use k256::ecdsa::SigningKey;

    use super::*;

    fn seed_manager(broadcaster: MockBroadcaster) -> (tempfile::TempDir, SeedManager, Store) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("bus")).unwrap();
        let tracker = Arc::new(ChainTracker::new(Duration::from_secs(600)));
        tracker.observe(1, chrono::DateTime::from_timestamp(1_000, 0).unwrap());
        let txmgr = TxManager::open(
            &db,
            Arc::new(broadcaster),
            tracker,
            TxManagerConfig::default(),
        )
        .unwrap();
        let store = Store::open_in_memory().unwrap();
        let signer = Signer::new(SigningKey::from_slice(&[3u8; 32]).unwrap(), "part1api");
        (dir, SeedManager::new(store.clone(), signer, txmgr), store)
    }

    fn accepting_broadcaster(times: usize) -> MockBroadcaster {
        let mut broadcaster = MockBroadcaster::new();
        broadcaster.expect_broadcast().times(times).returning(|_, _| {
            Ok(BroadcastResponse {
                code: 0,
                log: String::new(),
                tx_hash: "AB".to_owned(),
            })
        });
        broadcaster
    }

    #[tokio::test]
    async fn generates_non_negative_63_bit_seed() {
        let (_dir, manager, store) = seed_manager(accepting_broadcaster(1));
        let seed = manager.generate_and_submit(9).await.unwrap();

        assert!(seed.seed >= 0);
        assert_eq!(seed.epoch_index, 9);
        assert_eq!(seed.signature.len(), 128);
        assert_eq!(store.seed(SeedSlot::Upcoming).unwrap().unwrap(), seed);
    }

    #[tokio::test]
    async fn regeneration_for_same_epoch_reuses_seed() {
        let (_dir, manager, _store) = seed_manager(accepting_broadcaster(2));
        let first = manager.generate_and_submit(9).await.unwrap();
        let second = manager.generate_and_submit(9).await.unwrap();
        assert_eq!(first.seed, second.seed);
    }

    #[tokio::test]
    async fn claim_is_idempotent_per_seed() {
        let (_dir, manager, store) = seed_manager(accepting_broadcaster(1));
        store
            .set_seed(SeedSlot::Previous, &SeedInfo::new(5, 41, "sig"))
            .unwrap();

        manager.claim_previous().await.unwrap();
        assert!(store.seed(SeedSlot::Previous).unwrap().unwrap().claimed);

        // second call: no further broadcast (mock would panic)
        manager.claim_previous().await.unwrap();
    }

    #[tokio::test]
    async fn claim_without_previous_seed_is_a_no_op() {
        let (_dir, manager, _store) = seed_manager(MockBroadcaster::new());
        manager.claim_previous().await.unwrap();
    }
}
