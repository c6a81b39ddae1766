//! Per-block orchestration pipeline.

use std::{
    sync::Arc,
    time::Instant,
};

use chrono::{DateTime, Utc};
use infernet_block_observer::ObserverStatus;
use infernet_broker::BrokerHandle;
use infernet_chain::{ChainQuery, ChainReader};
use infernet_chain_tracker::ChainTracker;
use infernet_config::ReconcileConfig;
use infernet_db::{kv, Store};
use infernet_phase_tracker::{EpochPhase, EpochState, PhaseTracker};
use infernet_poc::PocOrchestrator;
use infernet_primitives::{BlockRef, Epoch};
use infernet_validation::Validator;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{HeightGateHandle, SeedManager};

/// Everything the dispatcher talks to. Wired once at startup.
pub struct DispatcherDeps {
    pub store: Store,
    pub reader: Arc<dyn ChainReader>,
    pub query: Arc<dyn ChainQuery>,
    pub chain_tracker: Arc<ChainTracker>,
    pub phase_tracker: Arc<PhaseTracker>,
    pub broker: BrokerHandle,
    pub poc: Arc<PocOrchestrator>,
    pub seeds: SeedManager,
    pub validator: Arc<Validator>,
    pub observer_status: watch::Sender<ObserverStatus>,
    pub height_gate: HeightGateHandle,
    pub reconcile: ReconcileConfig,
    pub participant: String,
}

#[derive(Debug, Clone, Copy)]
struct IntervalState {
    last_height: u64,
    last_at: Instant,
}

impl IntervalState {
    fn new() -> Self {
        Self {
            last_height: 0,
            last_at: Instant::now(),
        }
    }

    /// Fires when either the block count or the wall-clock interval has
    /// elapsed.
    fn due(&mut self, height: u64, blocks: u64, secs: u64) -> bool {
        let fired =
            height.saturating_sub(self.last_height) >= blocks || self.last_at.elapsed().as_secs() >= secs;
        if fired {
            self.last_height = height;
            self.last_at = Instant::now();
        }
        fired
    }
}

/// Runs the 8-step per-block pipeline on the serial block worker.
pub struct BlockDispatcher {
    deps: DispatcherDeps,
    /// Block the running PoC cycle is anchored to.
    poc_anchor: Option<(u64, String)>,
    poc_interval: IntervalState,
    inference_interval: IntervalState,
}

impl BlockDispatcher {
    pub fn new(deps: DispatcherDeps) -> Self {
        Self {
            deps,
            poc_anchor: None,
            poc_interval: IntervalState::new(),
            inference_interval: IntervalState::new(),
        }
    }

    pub async fn on_new_block(
        &mut self,
        height: u64,
        hash: String,
        time: Option<DateTime<Utc>>,
    ) -> eyre::Result<()> {
        // 1-2: refresh node status and the halt-detection cache.
        let status = self.deps.reader.status().await?;
        let block_time = time.unwrap_or(status.latest_block_time);
        self.deps.chain_tracker.observe(height, block_time);
        let is_synced = !status.catching_up;

        // 3: persist the height for restart continuity.
        self.deps.store.kv_put(kv::CURRENT_HEIGHT, &height)?;

        // 4: current epoch and governance params.
        let (epoch, params) = self.deps.query.current_epoch().await?;
        self.cache_chain_params().await;

        // 5: sync-gap verification hooks in here; out of core scope.

        // 6: recompute the phase state.
        let state = self.deps.phase_tracker.on_new_block(
            BlockRef::new(height, hash.clone()),
            &epoch,
            &params,
            is_synced,
        );

        // 7: phase-transition side-effects, in order, only when synced.
        if is_synced {
            self.stage_effects(&state, &epoch, height, &hash).await;
        } else {
            debug!(height, "node catching up; skipping phase side-effects");
        }

        // Wake the backfill observer and release gated tx handlers.
        let _ = self.deps.observer_status.send(ObserverStatus {
            current_height: height,
            is_caught_up: is_synced,
        });
        self.deps.height_gate.advance(height);

        // 8: interval-driven reconciliation.
        if is_synced {
            self.maybe_reconcile(state.current_phase, height).await;
        }

        Ok(())
    }

    /// Pull-through cache of governance-tunable params.
    async fn cache_chain_params(&self) {
        match self.deps.query.validation_params().await {
            Ok(params) => {
                if let Err(err) = self.deps.store.kv_put(kv::VALIDATION_PARAMS, &params) {
                    error!(%err, "cannot cache validation params");
                }
            }
            Err(err) => warn!(%err, "validation params query failed"),
        }
        match self.deps.query.bandwidth_params().await {
            Ok(params) => {
                if let Err(err) = self.deps.store.kv_put(kv::BANDWIDTH_PARAMS, &params) {
                    error!(%err, "cannot cache bandwidth params");
                }
            }
            Err(err) => warn!(%err, "bandwidth params query failed"),
        }
    }

    async fn stage_effects(&mut self, state: &EpochState, epoch: &Epoch, height: u64, hash: &str) {
        let ctx = state.latest_epoch;

        if ctx.is_start_of_poc_stage(height) {
            info!(height, "start of PoC stage");
            // Seed for the epoch being mined now, claimable one epoch later.
            if let Err(err) = self.deps.seeds.generate_and_submit(epoch.index() + 1).await {
                error!(%err, "seed generation failed");
            }
            self.poc_anchor = Some((height, hash.to_owned()));
            self.deps.poc.start_generation(height, hash.to_owned()).await;
        }

        if ctx.is_end_of_poc_stage(height) {
            info!(height, "end of PoC stage");
            self.deps.broker.init_validate(height, hash.to_owned()).await;
        }

        if ctx.is_start_of_poc_validation_stage(height) {
            info!(height, "start of PoC validation stage");
            self.deps
                .poc
                .start_validation(height, hash.to_owned())
                .await;
        }

        if ctx.is_end_of_poc_validation_stage(height) {
            info!(height, "end of PoC validation stage");
            self.deps.broker.inference_up_all().await;
        }

        if ctx.is_set_new_validators_stage(height) {
            info!(height, "set-new-validators stage");
            if let Err(err) = self.deps.seeds.rotate() {
                error!(%err, "seed rotation failed");
            }
            self.refresh_epoch_data(epoch).await;
        }

        if ctx.is_claim_money_stage(height) {
            if let Err(err) = self.deps.seeds.claim_previous().await {
                error!(%err, "reward claim failed");
            }
        }
    }

    /// Governance and power data the broker and validator need per epoch.
    async fn refresh_epoch_data(&self, epoch: &Epoch) {
        match self.deps.query.governance_models().await {
            Ok(models) => {
                let models: std::collections::BTreeSet<String> = models.into_iter().collect();
                self.deps.broker.set_governance_models(models.clone()).await;
                self.deps
                    .broker
                    .update_epoch_data(epoch.index(), models, Default::default())
                    .await;
            }
            Err(err) => warn!(%err, "governance model query failed"),
        }

        match self
            .deps
            .query
            .participant(self.deps.participant.clone())
            .await
        {
            Ok(Some(info)) => self.deps.validator.set_validator_power(info.power),
            Ok(None) => {}
            Err(err) => warn!(%err, "participant power query failed"),
        }
    }

    async fn maybe_reconcile(&mut self, phase: EpochPhase, height: u64) {
        let cfg = self.deps.reconcile.clone();
        match phase {
            EpochPhase::PocGeneration => {
                if self.poc_interval.due(height, cfg.poc_blocks, cfg.poc_secs) {
                    if let Some((anchor_height, anchor_hash)) = self.poc_anchor.clone() {
                        debug!(height, "reconciling PoC generation");
                        self.deps.broker.start_poc(anchor_height, anchor_hash).await;
                    }
                }
            }
            EpochPhase::PocValidation => {
                if self.poc_interval.due(height, cfg.poc_blocks, cfg.poc_secs) {
                    if let Some((anchor_height, anchor_hash)) = self.poc_anchor.clone() {
                        debug!(height, "reconciling PoC validation");
                        self.deps
                            .broker
                            .init_validate(anchor_height, anchor_hash)
                            .await;
                    }
                }
            }
            EpochPhase::Inference => {
                if self
                    .inference_interval
                    .due(height, cfg.inference_blocks, cfg.inference_secs)
                {
                    debug!(height, "reconciling inference serving");
                    self.deps.broker.inference_up_all().await;
                }
            }
            EpochPhase::PocGenerationWindDown | EpochPhase::PocValidationWindDown => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use infernet_broker::{build_broker, BrokerConfig};
    use infernet_chain::{
        BroadcastResponse, ChainStatus, MockBroadcaster, MockChainQuery, MockChainReader, Signer,
    };
    use infernet_config::ValidationParams;
    use infernet_db::SeedSlot;
    use infernet_node_client::{ExecutorClient, MockBatchHandler};
    use infernet_primitives::{EpochParams, SeedInfo};
    use infernet_txmgr::{TxManager, TxManagerConfig};
    use k256::ecdsa::SigningKey;

    use super::*;
    use crate::height_gate_pair;

    fn epoch_params() -> EpochParams {
        EpochParams {
            epoch_length: 200,
            poc_stage_duration: 50,
            poc_validation_delay: 10,
            poc_validation_duration: 50,
            set_new_validators_delay: 10,
            inference_validation_cutoff: 20,
        }
    }

    fn chain_status() -> ChainStatus {
        ChainStatus {
            latest_block_height: 1000,
            latest_block_time: DateTime::from_timestamp(5_000, 0).unwrap(),
            catching_up: false,
        }
    }

    struct Harness {
        dispatcher: BlockDispatcher,
        store: Store,
        _dir: tempfile::TempDir,
    }

    fn harness(broadcast_times: usize) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let bus = sled::open(dir.path().join("bus")).unwrap();

        let mut broadcaster = MockBroadcaster::new();
        broadcaster
            .expect_broadcast()
            .times(broadcast_times)
            .returning(|_, _| {
                Ok(BroadcastResponse {
                    code: 0,
                    log: String::new(),
                    tx_hash: "AB".to_owned(),
                })
            });

        let chain_tracker = Arc::new(ChainTracker::new(Duration::from_secs(600)));
        let txmgr = TxManager::open(
            &bus,
            Arc::new(broadcaster),
            chain_tracker.clone(),
            TxManagerConfig::default(),
        )
        .unwrap();
        // tracker must know a block time before any broadcast
        chain_tracker.observe(999, DateTime::from_timestamp(4_999, 0).unwrap());

        let mut reader = MockChainReader::new();
        reader.expect_status().returning(|| Ok(chain_status()));

        let mut query = MockChainQuery::new();
        query
            .expect_current_epoch()
            .returning(|| Ok((Epoch::new(5, 1000), epoch_params())));
        query
            .expect_validation_params()
            .returning(|| Ok(ValidationParams::default()));
        query
            .expect_bandwidth_params()
            .returning(|| Ok(infernet_config::BandwidthParams::default()));
        query.expect_governance_models().returning(|| Ok(vec![]));
        query.expect_participant().returning(|_| Ok(None));
        let query: Arc<dyn ChainQuery> = Arc::new(query);

        let (broker, broker_task) = build_broker(
            store.clone(),
            BrokerConfig::default(),
            Arc::new(MockBatchHandler::new()),
        );
        tokio::spawn(broker_task);

        let signer = Signer::new(SigningKey::from_slice(&[4u8; 32]).unwrap(), "part1api");
        let seeds = SeedManager::new(store.clone(), signer.clone(), txmgr.clone());
        let phase_tracker = Arc::new(PhaseTracker::new());
        let validator = Arc::new(Validator::new(
            broker.clone(),
            query.clone(),
            txmgr.clone(),
            ExecutorClient::new().unwrap(),
            signer,
            store.clone(),
            phase_tracker.clone(),
            "part1main".to_owned(),
            ValidationParams::default(),
        ));

        let (observer_status, _observer_rx) = watch::channel(ObserverStatus::default());
        let (gate_handle, _gate) = height_gate_pair(0);

        let poc = Arc::new(PocOrchestrator::new(broker.clone()));
        let dispatcher = BlockDispatcher::new(DispatcherDeps {
            store: store.clone(),
            reader: Arc::new(reader),
            query,
            chain_tracker,
            phase_tracker,
            broker,
            poc,
            seeds,
            validator,
            observer_status,
            height_gate: gate_handle,
            reconcile: ReconcileConfig::default(),
            participant: "part1main".to_owned(),
        });

        Harness {
            dispatcher,
            store,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn start_of_poc_generates_and_submits_seed() {
        let mut harness = harness(1);

        harness
            .dispatcher
            .on_new_block(1000, "H1000".to_owned(), None)
            .await
            .unwrap();

        let upcoming = harness.store.seed(SeedSlot::Upcoming).unwrap().unwrap();
        assert_eq!(upcoming.epoch_index, 6);
        assert_eq!(
            harness.store.kv_get::<u64>(kv::CURRENT_HEIGHT).unwrap(),
            Some(1000)
        );
    }

    #[tokio::test]
    async fn set_new_validators_rotates_and_claims() {
        // one broadcast for the claim
        let mut harness = harness(1);
        harness
            .store
            .set_seed(SeedSlot::Current, &SeedInfo::new(11, 5, "sig5"))
            .unwrap();
        harness
            .store
            .set_seed(SeedSlot::Upcoming, &SeedInfo::new(12, 6, "sig6"))
            .unwrap();

        harness
            .dispatcher
            .on_new_block(1120, "H1120".to_owned(), None)
            .await
            .unwrap();

        let previous = harness.store.seed(SeedSlot::Previous).unwrap().unwrap();
        assert_eq!(previous.epoch_index, 5);
        assert!(previous.claimed);
        assert_eq!(
            harness.store.seed(SeedSlot::Current).unwrap().unwrap().epoch_index,
            6
        );
        assert_eq!(harness.store.seed(SeedSlot::Upcoming).unwrap(), None);
    }

    #[tokio::test]
    async fn params_are_cached_every_block() {
        let mut harness = harness(0);
        harness
            .dispatcher
            .on_new_block(1005, "H1005".to_owned(), None)
            .await
            .unwrap();

        let cached: Option<ValidationParams> =
            harness.store.kv_get(kv::VALIDATION_PARAMS).unwrap();
        assert_eq!(cached, Some(ValidationParams::default()));
    }
}
