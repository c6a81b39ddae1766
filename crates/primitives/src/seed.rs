use serde::{Deserialize, Serialize};

/// Per-epoch validation seed, signed by the participant key.
///
/// The seed is a 63-bit non-negative value so it survives round-trips
/// through JSON number fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedInfo {
    pub seed: i64,
    pub epoch_index: u64,
    /// Hex encoded ECDSA signature over the big-endian seed bytes.
    pub signature: String,
    pub claimed: bool,
}

impl SeedInfo {
    pub fn new(seed: i64, epoch_index: u64, signature: impl Into<String>) -> Self {
        Self {
            seed,
            epoch_index,
            signature: signature.into(),
            claimed: false,
        }
    }
}
