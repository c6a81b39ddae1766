use infernet_primitives::{BlockRef, Epoch, EpochParams};
use parking_lot::RwLock;
use tracing::trace;

use crate::{EpochContext, EpochPhase};

/// Snapshot of the epoch machinery at one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochState {
    pub current_block: BlockRef,
    pub current_phase: EpochPhase,
    pub latest_epoch: EpochContext,
    /// When false, downstream components must skip phase-driven side-effects.
    pub is_synced: bool,
}

/// Rebuilds and caches [`EpochState`] for every observed block.
#[derive(Debug, Default)]
pub struct PhaseTracker {
    state: RwLock<Option<EpochState>>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the state for `block` and stores it. Returns the new state.
    pub fn on_new_block(
        &self,
        block: BlockRef,
        epoch: &Epoch,
        params: &EpochParams,
        is_synced: bool,
    ) -> EpochState {
        let context = EpochContext::derive(epoch, params);
        let state = EpochState {
            current_phase: context.classify(block.height()),
            current_block: block,
            latest_epoch: context,
            is_synced,
        };
        trace!(
            height = state.current_block.height(),
            phase = ?state.current_phase,
            is_synced,
            "phase tracker updated"
        );
        *self.state.write() = Some(state.clone());
        state
    }

    pub fn epoch_state(&self) -> Option<EpochState> {
        self.state.read().clone()
    }

    pub fn current_phase(&self) -> Option<EpochPhase> {
        self.state.read().as_ref().map(|state| state.current_phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> EpochParams {
        EpochParams {
            epoch_length: 200,
            poc_stage_duration: 50,
            poc_validation_delay: 10,
            poc_validation_duration: 50,
            set_new_validators_delay: 10,
            inference_validation_cutoff: 20,
        }
    }

    #[test]
    fn state_rebuilds_every_block() {
        let tracker = PhaseTracker::new();
        assert!(tracker.epoch_state().is_none());

        let epoch = Epoch::new(5, 1000);
        let first = tracker.on_new_block(BlockRef::new(1000, "a"), &epoch, &params(), true);
        assert_eq!(first.current_phase, EpochPhase::PocGeneration);

        let second = tracker.on_new_block(BlockRef::new(1050, "b"), &epoch, &params(), true);
        assert_eq!(second.current_phase, EpochPhase::PocGenerationWindDown);
        assert_eq!(tracker.epoch_state().unwrap(), second);
    }

    #[test]
    fn unsynced_block_is_still_recorded() {
        let tracker = PhaseTracker::new();
        let state =
            tracker.on_new_block(BlockRef::new(10, "x"), &Epoch::new(0, 0), &params(), false);
        assert!(!state.is_synced);
        assert_eq!(tracker.epoch_state().unwrap().current_block.height(), 10);
    }
}
