//! Backfill stage that turns finalized blocks into a stream of tx events.
//!
//! The dispatcher's live WebSocket feed can miss heights (reconnects,
//! restarts); this observer walks `last_processed_height` up to the tip,
//! pulling `block_results` for every missing height in order and emitting
//! the flattened tx events plus one barrier per height.

mod task;

pub use task::{build_block_observer, ObservedEvent, ObserverStatus};
