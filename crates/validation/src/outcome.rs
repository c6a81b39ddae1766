use infernet_chain::ChainMsg;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// How a re-run compared to the original inference.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// Token counts differ. Reported as valid until tokenization is
    /// guaranteed stable across node versions.
    DifferentLength { original: usize, validator: usize },
    /// Same length, different token sequence. Also reported as valid.
    DifferentTokens,
    /// Matching sequences; the computed similarity decides.
    Similarity(f64),
    /// No local node serves the model; treated as valid.
    ModelNotSupported,
}

impl ValidationOutcome {
    /// The value submitted on-chain.
    pub fn value(&self) -> f64 {
        match self {
            Self::DifferentLength { .. } | Self::DifferentTokens | Self::ModelNotSupported => 1.0,
            Self::Similarity(similarity) => *similarity,
        }
    }
}

/// Uniform reporting wrapper around an outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub inference_id: String,
    /// Validator-side response body, empty when no re-run happened.
    pub response_payload: String,
    pub outcome: ValidationOutcome,
    pub revalidation: bool,
}

impl ValidationReport {
    pub fn new(
        inference_id: impl Into<String>,
        response_payload: impl Into<String>,
        outcome: ValidationOutcome,
        revalidation: bool,
    ) -> Self {
        Self {
            inference_id: inference_id.into(),
            response_payload: response_payload.into(),
            outcome,
            revalidation,
        }
    }

    pub fn response_hash(&self) -> String {
        hex::encode(Sha256::digest(self.response_payload.as_bytes()))
    }

    /// Strictly-greater-than threshold check.
    pub fn successful(&self, passing_similarity: f64) -> bool {
        self.outcome.value() > passing_similarity
    }

    /// The on-chain message reporting this outcome.
    pub fn into_msg(self) -> ChainMsg {
        let response_hash = self.response_hash();
        ChainMsg::Validation {
            id: Uuid::new_v4().to_string(),
            inference_id: self.inference_id,
            response_payload: self.response_payload,
            response_hash,
            value: self.outcome.value(),
            revalidation: self.revalidation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_outcomes_report_valid() {
        assert_eq!(ValidationOutcome::DifferentTokens.value(), 1.0);
        assert_eq!(
            ValidationOutcome::DifferentLength {
                original: 2,
                validator: 3
            }
            .value(),
            1.0
        );
        assert_eq!(ValidationOutcome::ModelNotSupported.value(), 1.0);
    }

    #[test]
    fn threshold_is_strict() {
        let at_threshold =
            ValidationReport::new("i", "", ValidationOutcome::Similarity(0.99), false);
        assert!(!at_threshold.successful(0.99));

        let above = ValidationReport::new("i", "", ValidationOutcome::Similarity(1.0), false);
        assert!(above.successful(0.99));
    }

    #[test]
    fn report_msg_carries_value_and_hash() {
        let report = ValidationReport::new(
            "inf-1",
            r#"{"ok":true}"#,
            ValidationOutcome::Similarity(0.995),
            true,
        );
        let expected_hash = report.response_hash();

        match report.into_msg() {
            ChainMsg::Validation {
                inference_id,
                response_hash,
                value,
                revalidation,
                ..
            } => {
                assert_eq!(inference_id, "inf-1");
                assert_eq!(response_hash, expected_hash);
                assert_eq!(value, 0.995);
                assert!(revalidation);
            }
            other => panic!("unexpected msg: {other:?}"),
        }
    }
}
