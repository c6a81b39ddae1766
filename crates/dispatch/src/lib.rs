//! Event listening and per-block orchestration.
//!
//! The listener keeps the chain WebSocket subscriptions alive and feeds two
//! bounded worker queues: one serial block worker (height order matters) and
//! N tx workers. The block dispatcher runs the per-block pipeline including
//! the phase-transition side-effects.

mod dispatcher;
mod height_gate;
mod listener;
mod routing;
mod seed;

pub use dispatcher::{BlockDispatcher, DispatcherDeps};
pub use height_gate::{height_gate_pair, HeightGate, HeightGateHandle};
pub use listener::{run_event_listener, ListenerConfig, ListenerExit};
pub use routing::{classify_tx_event, TxAction};
pub use seed::SeedManager;
