//! infernetd binary entrypoint.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use argh::from_env;
use tracing::info;

mod args;
mod services;

use crate::args::{Args, EnvArgs};

fn main() -> Result<()> {
    let args: Args = from_env();
    let env = EnvArgs::from_env();

    init_logging();

    let config_path = args
        .config
        .clone()
        .or_else(|| env.config_path.clone())
        .ok_or_else(|| anyhow!("no config path; pass --config or set API_CONFIG_PATH"))?;

    let mut config =
        infernet_config::load_config(&config_path).context("failed to load configuration")?;
    apply_env(&mut config, &env);

    let sqlite_path = args
        .sqlite_path
        .clone()
        .or_else(|| env.sqlite_path.clone())
        .unwrap_or_else(|| default_sibling(&config_path, "infernet.db"));
    let bus_path = args
        .bus_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.bus.path));

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("infernet-rt")
        .build()
        .context("failed to build runtime")?;

    rt.block_on(services::run(config, sqlite_path, bus_path))?;

    info!("exiting infernetd");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn apply_env(config: &mut infernet_config::Config, env: &EnvArgs) {
    if let Some(key_name) = &env.key_name {
        config.chain_node.signer_key_name = key_name.clone();
    }
    if let Some(backend) = &env.keyring_backend {
        config.chain_node.keyring_backend = backend.clone();
    }
    if env.enforced_model.is_some() {
        config.enforced_model = env.enforced_model.clone();
    }
}

fn default_sibling(config_path: &std::path::Path, name: &str) -> PathBuf {
    config_path
        .parent()
        .map(|dir| dir.join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}
