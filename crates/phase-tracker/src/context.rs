use infernet_primitives::{Epoch, EpochParams};
use serde::{Deserialize, Serialize};

/// Phase of an epoch at a given height.
///
/// The wind-down sub-phases bracket the PoC boundaries: nodes finish their
/// in-flight work there while no new PoC work starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpochPhase {
    /// Before this epoch's PoC begins.
    Inference,
    /// Nodes grind PoC batches.
    PocGeneration,
    /// Generation over, validation not yet open.
    PocGenerationWindDown,
    /// Nodes cross-validate received batches.
    PocValidation,
    /// Validation over, validator set not yet rotated.
    PocValidationWindDown,
}

/// Canonical block boundaries of one epoch. Pure derivation from
/// `(epoch, params)`; never mutated after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochContext {
    epoch_index: u64,
    start_of_poc: u64,
    end_of_poc: u64,
    start_of_validation: u64,
    end_of_validation: u64,
    set_new_validators: u64,
    next_poc: u64,
    inference_validation_cutoff: u64,
}

impl EpochContext {
    pub fn derive(epoch: &Epoch, params: &EpochParams) -> Self {
        let start_of_poc = epoch.poc_start_block_height();
        let end_of_poc = start_of_poc + params.poc_stage_duration;
        let start_of_validation = end_of_poc + params.poc_validation_delay;
        let end_of_validation = start_of_validation + params.poc_validation_duration;
        let set_new_validators = end_of_validation + params.set_new_validators_delay;
        let next_poc = start_of_poc + params.epoch_length;
        Self {
            epoch_index: epoch.index(),
            start_of_poc,
            end_of_poc,
            start_of_validation,
            end_of_validation,
            set_new_validators,
            next_poc,
            inference_validation_cutoff: next_poc.saturating_sub(params.inference_validation_cutoff),
        }
    }

    pub fn epoch_index(&self) -> u64 {
        self.epoch_index
    }

    pub fn start_of_poc(&self) -> u64 {
        self.start_of_poc
    }

    pub fn end_of_poc(&self) -> u64 {
        self.end_of_poc
    }

    pub fn start_of_validation(&self) -> u64 {
        self.start_of_validation
    }

    pub fn end_of_validation(&self) -> u64 {
        self.end_of_validation
    }

    pub fn set_new_validators(&self) -> u64 {
        self.set_new_validators
    }

    pub fn next_poc(&self) -> u64 {
        self.next_poc
    }

    pub fn inference_validation_cutoff(&self) -> u64 {
        self.inference_validation_cutoff
    }

    /// Phase classification, inclusive-left exclusive-right.
    pub fn classify(&self, height: u64) -> EpochPhase {
        if height < self.start_of_poc {
            EpochPhase::Inference
        } else if height < self.end_of_poc {
            EpochPhase::PocGeneration
        } else if height < self.start_of_validation {
            EpochPhase::PocGenerationWindDown
        } else if height < self.end_of_validation {
            EpochPhase::PocValidation
        } else if height < self.set_new_validators {
            EpochPhase::PocValidationWindDown
        } else {
            EpochPhase::Inference
        }
    }

    // Stage predicates, one height each.

    pub fn is_start_of_poc_stage(&self, height: u64) -> bool {
        height == self.start_of_poc
    }

    pub fn is_end_of_poc_stage(&self, height: u64) -> bool {
        height == self.end_of_poc
    }

    pub fn is_start_of_poc_validation_stage(&self, height: u64) -> bool {
        height == self.start_of_validation
    }

    pub fn is_end_of_poc_validation_stage(&self, height: u64) -> bool {
        height == self.end_of_validation
    }

    pub fn is_set_new_validators_stage(&self, height: u64) -> bool {
        height == self.set_new_validators
    }

    /// Reward claims ride the same stage as the validator rotation; the
    /// dispatcher rotates first, then claims.
    pub fn is_claim_money_stage(&self, height: u64) -> bool {
        height == self.set_new_validators
    }

    /// Whether inference validation may still report for this epoch.
    pub fn within_inference_validation_window(&self, height: u64) -> bool {
        height < self.inference_validation_cutoff
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

    fn ctx() -> EpochContext {
        EpochContext::derive(&Epoch::new(5, 1000), &params())
    }

    #[test]
    fn boundaries_follow_the_happy_cycle() {
        let ctx = ctx();
        assert_eq!(ctx.start_of_poc(), 1000);
        assert_eq!(ctx.end_of_poc(), 1050);
        assert_eq!(ctx.start_of_validation(), 1060);
        assert_eq!(ctx.end_of_validation(), 1110);
        assert_eq!(ctx.set_new_validators(), 1120);
        assert_eq!(ctx.next_poc(), 1200);
        assert_eq!(ctx.inference_validation_cutoff(), 1180);
    }

    #[test]
    fn classification_is_left_inclusive_right_exclusive() {
        let ctx = ctx();
        assert_eq!(ctx.classify(999), EpochPhase::Inference);
        assert_eq!(ctx.classify(1000), EpochPhase::PocGeneration);
        assert_eq!(ctx.classify(1049), EpochPhase::PocGeneration);
        assert_eq!(ctx.classify(1050), EpochPhase::PocGenerationWindDown);
        assert_eq!(ctx.classify(1060), EpochPhase::PocValidation);
        assert_eq!(ctx.classify(1109), EpochPhase::PocValidation);
        assert_eq!(ctx.classify(1110), EpochPhase::PocValidationWindDown);
        assert_eq!(ctx.classify(1120), EpochPhase::Inference);
    }

    #[test]
    fn stage_predicates_fire_on_exactly_one_height() {
        let ctx = ctx();
        let hits: Vec<u64> = (990..1210).filter(|h| ctx.is_end_of_poc_stage(*h)).collect();
        assert_eq!(hits, vec![1050]);

        let rotations: Vec<u64> = (990..1210)
            .filter(|h| ctx.is_set_new_validators_stage(*h))
            .collect();
        assert_eq!(rotations, vec![1120]);
    }

    #[test]
    fn validation_window_closes_at_cutoff() {
        let ctx = ctx();
        assert!(ctx.within_inference_validation_window(1179));
        assert!(!ctx.within_inference_validation_window(1180));
    }
}
