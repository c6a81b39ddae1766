//! PoC orchestration: drives generate/validate cycles on the local nodes
//! and turns their WebSocket batches into chain submissions.

mod handler;
mod orchestrator;

pub use handler::{PocBatchHandler, PocSubmitter};
pub use orchestrator::PocOrchestrator;
