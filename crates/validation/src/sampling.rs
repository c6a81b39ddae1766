//! Deterministic, seeded validation sampling.

use infernet_config::ValidationParams;
use sha2::{Digest, Sha256};

/// Power figures of one finished inference, as read from the chain.
#[derive(Debug, Clone)]
pub struct SamplingInfo {
    pub inference_id: String,
    pub executor_id: String,
    pub total_power: u64,
    pub executor_power: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingDecision {
    pub validate: bool,
    pub reason: String,
}

impl SamplingDecision {
    fn skip(reason: impl Into<String>) -> Self {
        Self {
            validate: false,
            reason: reason.into(),
        }
    }
}

/// Decides whether this validator samples the inference.
///
/// Deterministic in its inputs: every honest validator reaches the same
/// decision for the same epoch seed.
pub fn should_validate(
    seed: i64,
    info: &SamplingInfo,
    validator_power: u64,
    validator_address: &str,
    params: &ValidationParams,
) -> SamplingDecision {
    if info.executor_id == validator_address {
        return SamplingDecision::skip("executor cannot validate its own inference");
    }
    if info.total_power <= info.executor_power {
        return SamplingDecision::skip("no non-executor power in epoch");
    }

    let other_power = (info.total_power - info.executor_power) as f64;
    let share = validator_power as f64 / other_power;
    let probability = share.clamp(
        params.min_validation_probability,
        params.max_validation_probability,
    );

    let uniform = hash_uniform(seed, &info.inference_id, validator_address);
    if uniform < probability {
        SamplingDecision {
            validate: true,
            reason: format!("sampled: u={uniform:.6} < p={probability:.6}"),
        }
    } else {
        SamplingDecision::skip(format!("not sampled: u={uniform:.6} >= p={probability:.6}"))
    }
}

/// Uniform in [0, 1) derived from `(seed, inference_id, validator)`.
fn hash_uniform(seed: i64, inference_id: &str, validator: &str) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_be_bytes());
    hasher.update(inference_id.as_bytes());
    hasher.update(validator.as_bytes());
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) as f64 / (u64::MAX as f64 + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(executor: &str) -> SamplingInfo {
        SamplingInfo {
            inference_id: "aW5mLTE=".to_owned(),
            executor_id: executor.to_owned(),
            total_power: 1_000,
            executor_power: 400,
        }
    }

    fn params(min: f64, max: f64) -> ValidationParams {
        ValidationParams {
            min_validation_probability: min,
            max_validation_probability: max,
            ..Default::default()
        }
    }

    #[test]
    fn executor_never_validates_itself() {
        let decision = should_validate(7, &info("val1"), 100, "val1", &params(0.0, 1.0));
        assert!(!decision.validate);
    }

    #[test]
    fn skips_when_executor_holds_all_power() {
        let mut all_power = info("exec");
        all_power.executor_power = all_power.total_power;
        let decision = should_validate(7, &all_power, 100, "val1", &params(0.0, 1.0));
        assert!(!decision.validate);
    }

    #[test]
    fn probability_one_always_samples() {
        let decision = should_validate(7, &info("exec"), 100, "val1", &params(1.0, 1.0));
        assert!(decision.validate);
    }

    #[test]
    fn decision_is_deterministic() {
        let p = params(0.0, 1.0);
        let first = should_validate(42, &info("exec"), 100, "val1", &p);
        for _ in 0..10 {
            assert_eq!(should_validate(42, &info("exec"), 100, "val1", &p), first);
        }
    }

    #[test]
    fn different_seeds_flip_some_decisions() {
        let p = params(0.0, 1.0);
        let mut saw_yes = false;
        let mut saw_no = false;
        for seed in 0..512 {
            let decision = should_validate(seed, &info("exec"), 100, "val1", &p);
            saw_yes |= decision.validate;
            saw_no |= !decision.validate;
        }
        // validator share ~ 1/6: both outcomes must show up across seeds
        assert!(saw_yes && saw_no);
    }
}
