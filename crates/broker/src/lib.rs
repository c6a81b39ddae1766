//! Node broker: the single-writer actor owning all ML-node state.
//!
//! Every mutation and consistent read of node state goes through the broker
//! task's command queue, one command at a time. Per-node workers drive the
//! actual ML-node HTTP transitions and report observations back as commands,
//! so the actor itself never blocks on the network.

mod actor;
mod command;
mod error;
mod handle;
mod locking;
mod state;
mod worker;

pub use actor::{build_broker, BrokerConfig};
pub use command::{EpochMlNodeInfo, LockedNode, ReleaseOutcome};
pub use error::BrokerError;
pub use handle::BrokerHandle;
pub use locking::{do_with_locked_node_retry, LockRetryError};
pub use state::{NodeState, NodeView, ReconcileInfo};
