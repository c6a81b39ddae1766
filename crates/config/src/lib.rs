//! Static configuration for the infernet control plane.
//!
//! The config file is YAML; selected values can be overridden from the
//! environment with `DAPI_`-prefixed dotted keys (`DAPI_API__ADMIN_PORT=9201`
//! maps to `api.admin_port`). Dynamic state lives in the SQL store, not here.

mod config;
mod error;
mod loader;
mod params;

pub use config::{
    ApiConfig, BusConfig, ChainNodeConfig, Config, EnforcedModel, MlNodeKeyConfig, ReconcileConfig,
    WorkerConfig,
};
pub use error::ConfigError;
pub use loader::{apply_env_overrides, load_config, parse_override};
pub use params::{BandwidthParams, ValidationParams};
