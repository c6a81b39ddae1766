//! Embedded SQL store for dynamic control-plane state.
//!
//! Static config comes from the YAML file; everything that changes at
//! runtime (registered nodes, KV state, seeds, prompt payloads) lives here.
//! The store holds a single connection in WAL mode behind a mutex; all
//! writers serialize on it.

mod error;
mod keys;
mod migrations;
mod store;

pub use error::{DbError, DbResult};
pub use keys::{kv, UpgradePlan};
pub use store::{PromptPayload, SeedSlot, Store};
