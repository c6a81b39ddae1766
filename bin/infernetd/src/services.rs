//! Service construction and lifecycle.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use infernet_api::{admin_router, public_router, run_server, ApiState};
use infernet_block_observer::{build_block_observer, ObserverStatus};
use infernet_broker::{build_broker, BrokerConfig};
use infernet_chain::{FileKeyring, GrpcQueryClient, RpcClient, Signer, TxBroadcaster};
use infernet_chain_tracker::ChainTracker;
use infernet_config::Config;
use infernet_db::{kv, Store};
use infernet_dispatch::{
    run_event_listener, BlockDispatcher, DispatcherDeps, ListenerConfig, ListenerExit, SeedManager,
};
use infernet_node_client::ExecutorClient;
use infernet_phase_tracker::PhaseTracker;
use infernet_poc::{PocBatchHandler, PocOrchestrator};
use infernet_txmgr::{BatchSender, TxManager, TxManagerConfig};
use infernet_validation::{run_startup_recovery, Validator};
use tokio::sync::watch;
use tracing::{error, info, warn};

pub(crate) async fn run(config: Config, sqlite_path: PathBuf, bus_path: PathBuf) -> Result<()> {
    // Stores first: only config-time failures abort startup.
    let store = Store::open(&sqlite_path)
        .with_context(|| format!("cannot open state db at {}", sqlite_path.display()))?;
    let bus = sled::open(&bus_path)
        .with_context(|| format!("cannot open stream store at {}", bus_path.display()))?;

    // Mirror dynamic config and version markers into the store.
    let previous_version: Option<String> = store.kv_get(kv::CURRENT_NODE_VERSION)?;
    if let Some(previous_version) = previous_version {
        store.kv_put(kv::LAST_USED_VERSION, &previous_version)?;
    }
    store.kv_put(kv::CURRENT_NODE_VERSION, &env!("CARGO_PKG_VERSION"))?;
    store.kv_put(kv::ML_NODE_KEY_CONFIG, &config.ml_node_key_config)?;

    // Chain clients and the signing key.
    let rpc = RpcClient::new(&config.chain_node.rpc_url).context("bad rpc url")?;
    let query = Arc::new(GrpcQueryClient::new(&config.chain_node.grpc_url).context("bad grpc url")?);

    let keyring_dir = if config.chain_node.keyring_dir.is_empty() {
        std::env::var("HOME").unwrap_or_else(|_| ".".to_owned())
    } else {
        config.chain_node.keyring_dir.clone()
    };
    let keyring = FileKeyring::new(keyring_dir, config.chain_node.keyring_backend.clone());
    let signing_key = keyring
        .load(&config.chain_node.signer_key_name)
        .context("cannot load signer key")?;
    let signer = Signer::new(signing_key, config.chain_node.signer_address.clone());
    let participant_pubkey = hex::encode(signer.pubkey_bytes());

    let broadcaster = Arc::new(TxBroadcaster::new(
        rpc.clone(),
        signer.clone(),
        config.chain_node.chain_id.clone(),
        config.chain_node.account_address.clone(),
        config.chain_node.account_number,
    ));

    // Trackers and the outbox.
    let chain_tracker = Arc::new(ChainTracker::new(config.chain_node.halt_timeout()));
    let phase_tracker = Arc::new(PhaseTracker::new());
    let txmgr = TxManager::open(
        &bus,
        broadcaster.clone(),
        chain_tracker.clone(),
        TxManagerConfig::default(),
    )
    .context("cannot open tx outbox")?;
    let batch_sender = BatchSender::open(
        &bus,
        txmgr.clone(),
        config.bus.flush_size,
        config.bus.flush_timeout(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // The broker and its per-node workers.
    let poc_handler = Arc::new(PocBatchHandler::new(txmgr.clone()));
    let (broker, broker_task) = build_broker(
        store.clone(),
        BrokerConfig {
            participant_pubkey,
            poc_callback_url: config.api.public_url.clone(),
            enforced_model: config.enforced_model.clone(),
            ..Default::default()
        },
        poc_handler,
    );
    tokio::spawn(broker_task);

    // Config-file nodes are upserted on boot; persisted ones already loaded.
    for spec in config.nodes.clone() {
        let id = spec.id.clone();
        match broker.update_node(spec.clone()).await {
            Ok(_) => {}
            Err(infernet_broker::BrokerError::UnknownNode(_)) => {
                if let Err(err) = broker.register_node(spec).await {
                    warn!(node_id = %id, %err, "cannot register configured node");
                }
            }
            Err(err) => warn!(node_id = %id, %err, "cannot update configured node"),
        }
    }

    let poc = Arc::new(PocOrchestrator::new(broker.clone()));
    let seeds = SeedManager::new(store.clone(), signer.clone(), txmgr.clone());
    let validator = Arc::new(Validator::new(
        broker.clone(),
        query.clone(),
        txmgr.clone(),
        ExecutorClient::new().context("cannot build executor client")?,
        signer.clone(),
        store.clone(),
        phase_tracker.clone(),
        config.chain_node.account_address.clone(),
        config.validation_params.clone(),
    ));

    // Block observer feeding the dispatcher's tx workers.
    let (observer_status_tx, observer_status_rx) = watch::channel(ObserverStatus::default());
    let (observer_events, observer_task) =
        build_block_observer(store.clone(), Arc::new(rpc.clone()), observer_status_rx);
    tokio::spawn(observer_task);

    let initial_height: u64 = store.kv_get(kv::CURRENT_HEIGHT)?.unwrap_or_default();
    let (gate_handle, gate) = infernet_dispatch::height_gate_pair(initial_height);

    let dispatcher = BlockDispatcher::new(DispatcherDeps {
        store: store.clone(),
        reader: Arc::new(rpc.clone()),
        query: query.clone(),
        chain_tracker: chain_tracker.clone(),
        phase_tracker: phase_tracker.clone(),
        broker: broker.clone(),
        poc,
        seeds,
        validator: validator.clone(),
        observer_status: observer_status_tx,
        height_gate: gate_handle.clone(),
        reconcile: config.reconcile.clone(),
        participant: config.chain_node.account_address.clone(),
    });

    // Outbox consumers and the batch flusher.
    tokio::spawn(txmgr.clone().run(shutdown_rx.clone()));
    tokio::spawn(batch_sender.clone().run(shutdown_rx.clone()));

    // HTTP surfaces.
    let api_state = ApiState {
        broker: broker.clone(),
        store: store.clone(),
        phase_tracker: phase_tracker.clone(),
        participant: config.chain_node.account_address.clone(),
        batch: Some(batch_sender.clone()),
    };
    {
        let addr = config.api.admin_listen_addr.clone();
        let router = admin_router(api_state.clone());
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(err) = run_server(&addr, router, shutdown).await {
                error!(%err, "admin server failed");
            }
        });
    }
    {
        let addr = config.api.public_listen_addr.clone();
        let router = public_router(api_state);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(err) = run_server(&addr, router, shutdown).await {
                error!(%err, "public server failed");
            }
        });
    }

    // Missed-validation sweep and reward claim for the previous epoch.
    {
        let validator = validator.clone();
        let store = store.clone();
        let query = query.clone();
        let txmgr = txmgr.clone();
        tokio::spawn(async move {
            if let Err(err) =
                run_startup_recovery(validator.as_ref(), &store, query.as_ref(), &txmgr).await
            {
                error!(%err, "startup recovery failed");
            }
        });
    }

    // The listener owns the dispatcher and the worker pools.
    let mut listener = tokio::spawn(run_event_listener(
        ListenerConfig {
            ws_url: config.chain_node.ws_url.clone(),
            tx_workers: config.workers.tx_workers,
            ..Default::default()
        },
        dispatcher,
        validator,
        store.clone(),
        observer_events,
        gate,
        gate_handle,
        shutdown_rx.clone(),
    ));

    info!("infernetd started");

    let listener_exit = tokio::select! {
        _ = tokio::signal::ctrl_c() => None,
        exit = &mut listener => Some(exit),
    };

    match listener_exit {
        None => {
            info!("interrupt received; shutting down");
            let _ = shutdown_tx.send(true);
            let _ = listener.await;
        }
        Some(exit) => {
            match exit {
                Ok(ListenerExit::UpgradePending) => {
                    info!("stopping for a pending chain upgrade");
                }
                Ok(ListenerExit::Shutdown) => {}
                Err(err) => error!(%err, "listener task failed"),
            }
            let _ = shutdown_tx.send(true);
        }
    }

    Ok(())
}
