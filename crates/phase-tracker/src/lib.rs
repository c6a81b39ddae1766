//! Epoch phase derivation from block heights.
//!
//! All boundaries are pure functions of `(epoch, params)`; the tracker just
//! caches the state computed for the latest block. Intervals are
//! inclusive-left, exclusive-right.

mod context;
mod tracker;

pub use context::{EpochContext, EpochPhase};
pub use tracker::{EpochState, PhaseTracker};
