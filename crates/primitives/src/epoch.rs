use serde::{Deserialize, Serialize};

/// On-chain parameters governing epoch phase lengths, in blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochParams {
    pub epoch_length: u64,
    pub poc_stage_duration: u64,
    pub poc_validation_delay: u64,
    pub poc_validation_duration: u64,
    pub set_new_validators_delay: u64,
    /// Blocks before the next PoC start at which inference validation stops.
    pub inference_validation_cutoff: u64,
}

impl EpochParams {
    /// Total span from PoC start until seeds rotate for the next epoch.
    pub fn poc_span(&self) -> u64 {
        self.poc_stage_duration
            + self.poc_validation_delay
            + self.poc_validation_duration
            + self.set_new_validators_delay
    }
}

/// Identity of one epoch as reported by the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    index: u64,
    poc_start_block_height: u64,
}

impl Epoch {
    pub fn new(index: u64, poc_start_block_height: u64) -> Self {
        Self {
            index,
            poc_start_block_height,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn poc_start_block_height(&self) -> u64 {
        self.poc_start_block_height
    }
}
