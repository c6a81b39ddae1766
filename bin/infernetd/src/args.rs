//! CLI argument parsing and environment variable handling.

use std::path::PathBuf;

use argh::FromArgs;
use infernet_config::EnforcedModel;

#[derive(Clone, Debug, FromArgs)]
#[argh(description = "infernet participant control plane")]
pub(crate) struct Args {
    /// path to the YAML configuration
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    /// sqlite database path, overriding the default next to the config
    #[argh(option)]
    pub sqlite_path: Option<PathBuf>,

    /// durable stream store path for the tx outbox
    #[argh(option)]
    pub bus_path: Option<PathBuf>,
}

/// Sensitive values and operational toggles read from the environment.
#[derive(Debug, Clone, Default)]
pub(crate) struct EnvArgs {
    pub config_path: Option<PathBuf>,
    pub sqlite_path: Option<PathBuf>,
    pub key_name: Option<String>,
    pub keyring_backend: Option<String>,
    pub enforced_model: Option<EnforcedModel>,
}

impl EnvArgs {
    pub(crate) fn from_env() -> Self {
        let enforced_model = std::env::var("ENFORCED_MODEL_ID").ok().map(|model_id| {
            let args = std::env::var("ENFORCED_MODEL_ARGS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|arg| !arg.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default();
            EnforcedModel { model_id, args }
        });

        Self {
            config_path: std::env::var("API_CONFIG_PATH").ok().map(PathBuf::from),
            sqlite_path: std::env::var("API_SQLITE_PATH").ok().map(PathBuf::from),
            key_name: std::env::var("KEY_NAME").ok(),
            keyring_backend: std::env::var("KEYRING_BACKEND").ok(),
            enforced_model,
        }
    }
}
