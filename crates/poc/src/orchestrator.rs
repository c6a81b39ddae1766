use infernet_broker::BrokerHandle;
use parking_lot::Mutex;
use tracing::info;

/// Drives PoC generate/validate cycles against the local nodes.
///
/// The heavy lifting happens in the nodes themselves; this orchestrator
/// remembers the cycle's anchor height and nudges the broker at the right
/// stages.
pub struct PocOrchestrator {
    broker: BrokerHandle,
    /// Height the running PoC cycle started at. Validation requests are
    /// anchored to it, not to the validation-stage height.
    stage_start: Mutex<Option<(u64, String)>>,
}

impl PocOrchestrator {
    pub fn new(broker: BrokerHandle) -> Self {
        Self {
            broker,
            stage_start: Mutex::new(None),
        }
    }

    /// Start-of-PoC: every enabled node begins generating.
    pub async fn start_generation(&self, block_height: u64, block_hash: String) {
        info!(block_height, "starting poc generation cycle");
        *self.stage_start.lock() = Some((block_height, block_hash.clone()));
        self.broker.start_poc(block_height, block_hash).await;
    }

    /// Start of the validation stage: nodes validate the batches they
    /// received during generation.
    pub async fn start_validation(&self, fallback_height: u64, fallback_hash: String) {
        let (height, hash) = self
            .stage_start
            .lock()
            .clone()
            .unwrap_or((fallback_height, fallback_hash));
        info!(height, "starting poc validation cycle");
        self.broker.init_validate(height, hash).await;
    }
}
