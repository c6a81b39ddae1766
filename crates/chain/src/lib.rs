//! Thin facade over the chain full node: Tendermint JSON-RPC, the WebSocket
//! event stream, the gRPC query service, and transaction building/signing.
//!
//! No business logic lives here; callers own retries and orchestration.

mod broadcast;
mod classify;
mod error;
mod events;
mod messages;
mod proto;
mod query;
mod rpc;
mod signer;
mod traits;
mod types;

pub use broadcast::{BroadcastResponse, TxBroadcaster, TxLookup};
pub use classify::{classify_broadcast, BroadcastClass};
pub use error::ChainError;
pub use events::{ChainWsEvent, EventSocket, SUBSCRIPTION_QUERIES};
pub use messages::ChainMsg;
pub use query::GrpcQueryClient;
pub use rpc::RpcClient;
pub use signer::{FileKeyring, Signer};
pub use traits::{Broadcaster, ChainQuery, ChainReader, ParticipantInfo, SettleAmount};
#[cfg(feature = "test-utils")]
pub use traits::{MockBroadcaster, MockChainQuery, MockChainReader};
pub use types::{BlockResults, ChainStatus, TxEventData, TxResult};
