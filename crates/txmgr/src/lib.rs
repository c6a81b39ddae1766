//! Durable transaction outbox.
//!
//! Submitted messages ride two persistent streams: `send` (pending
//! broadcast) and `observe` (broadcast, awaiting inclusion). Consumers are
//! at-least-once; every handler returns an explicit verdict. High-volume
//! inference messages go through the batch consumer instead, which coalesces
//! them into composite transactions.

mod batch;
mod envelope;
mod handlers;
mod manager;
mod stream;

pub use batch::BatchSender;
pub use envelope::{TxEnvelope, MAX_ATTEMPTS};
pub use handlers::Verdict;
pub use manager::{TxManager, TxManagerConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TxError {
    /// Broadcast failed; the message is parked on the send stream.
    #[error("tx failed to broadcast and was put on retry")]
    FailedQueuedForRetry,

    /// Broadcast failed with a code that will never succeed; dropped.
    #[error("tx rejected as critical: {0}")]
    Critical(String),

    /// Sync send flavor: the tx did not land within the wait window.
    #[error("timed out waiting for tx inclusion")]
    InclusionTimeout,

    #[error("chain: {0}")]
    Chain(#[from] infernet_chain::ChainError),

    #[error("outbox store: {0}")]
    Store(#[from] sled::Error),

    #[error("envelope encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}
