use serde::{Deserialize, Serialize};

/// Well-known keys of the `kv_config` table.
pub mod kv {
    pub const CURRENT_HEIGHT: &str = "current_height";
    pub const LAST_PROCESSED_HEIGHT: &str = "last_processed_height";
    pub const UPGRADE_PLAN: &str = "upgrade_plan";
    pub const SEED_CURRENT: &str = "seed_current";
    pub const SEED_PREVIOUS: &str = "seed_previous";
    pub const SEED_UPCOMING: &str = "seed_upcoming";
    pub const CURRENT_NODE_VERSION: &str = "current_node_version";
    pub const LAST_USED_VERSION: &str = "last_used_version";
    pub const VALIDATION_PARAMS: &str = "validation_params";
    pub const BANDWIDTH_PARAMS: &str = "bandwidth_params";
    pub const ML_NODE_KEY_CONFIG: &str = "ml_node_key_config";
}

/// Scheduled chain upgrade, mirrored from governance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradePlan {
    pub name: String,
    pub height: u64,
}
