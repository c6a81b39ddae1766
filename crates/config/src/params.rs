use serde::{Deserialize, Serialize};

/// Chain-governed validation parameters, cached locally every block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationParams {
    /// Lower clip for the per-inference sampling probability.
    pub min_validation_probability: f64,
    /// Upper clip for the per-inference sampling probability.
    pub max_validation_probability: f64,
    /// Denominator guard in the logprob distance normalization.
    pub epsilon: f64,
    /// Similarity strictly above this value passes.
    pub passing_similarity: f64,
    /// Attempts at locking a node before giving up on a validation.
    pub max_lock_attempts: u32,
}

impl Default for ValidationParams {
    fn default() -> Self {
        Self {
            min_validation_probability: 0.01,
            max_validation_probability: 1.0,
            epsilon: 1e-6,
            passing_similarity: 0.99,
            max_lock_attempts: 5,
        }
    }
}

/// Chain-governed bandwidth accounting parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthParams {
    pub estimated_limits_per_block_kb: u64,
    pub kb_per_input_token: f64,
    pub kb_per_output_token: f64,
}

impl Default for BandwidthParams {
    fn default() -> Self {
        Self {
            estimated_limits_per_block_kb: 1_024,
            kb_per_input_token: 0.02,
            kb_per_output_token: 0.1,
        }
    }
}
