//! HTTP and WebSocket clients for the local ML-nodes and remote executors.
//!
//! Every ML-node gets its own dedicated client; nothing mutable is shared
//! across nodes.

mod error;
mod executor;
mod mlnode;
mod poc_ws;
mod types;

pub use error::NodeClientError;
pub use executor::{ExecutorClient, PayloadsResponse};
pub use mlnode::MlNodeClient;
#[cfg(feature = "test-utils")]
pub use poc_ws::MockBatchHandler;
pub use poc_ws::{run_poc_ws_client, BatchHandler, PocWsConfig, PocWsMessage};
pub use types::{
    DiskInfo, GpuDevice, InferenceUpRequest, ModelInfo, NodeStateResponse, PocInitRequest,
    PowStatusResponse,
};
