//! Inference validation pipeline.
//!
//! Samples finished inferences with a seeded probabilistic rule, re-runs
//! them on a locked local node, compares logits, and reports a similarity
//! verdict on-chain.

mod logits;
mod outcome;
mod pipeline;
mod recovery;
mod sampling;

pub use logits::{compare_logits, extract_token_logprobs, TokenLogprobs};
pub use outcome::{ValidationOutcome, ValidationReport};
pub use pipeline::{ValidationError, Validator};
pub use recovery::{missed_validations, run_startup_recovery};
pub use sampling::{should_validate, SamplingDecision, SamplingInfo};
