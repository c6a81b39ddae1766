//! Lock-run-release helper with transport-aware retry.

use std::{collections::HashSet, future::Future};

use infernet_node_client::NodeClientError;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{command::LockedNode, BrokerHandle, ReleaseOutcome};

#[derive(Debug, Error)]
pub enum LockRetryError {
    /// No node currently serves the model (or all were skipped).
    #[error("no node available for model '{model}'")]
    NoNodeAvailable { model: String },

    /// The node answered with an application error; not retried.
    #[error("node rejected request: {0}")]
    Application(NodeClientError),

    /// Every attempt hit a transport failure.
    #[error("all {attempts} lock attempts failed in transport")]
    AttemptsExhausted { attempts: u32 },

    #[error(transparent)]
    Broker(#[from] crate::BrokerError),
}

/// Locks a node, runs `f` against it, and releases it with the right
/// outcome.
///
/// Transport failures trigger a status re-query on the failed node, add it
/// to the skip set, and move on to another node. Application errors are
/// surfaced immediately.
pub async fn do_with_locked_node_retry<T, F, Fut>(
    broker: &BrokerHandle,
    model: &str,
    version: Option<String>,
    max_attempts: u32,
    f: F,
) -> Result<T, LockRetryError>
where
    F: Fn(LockedNode) -> Fut,
    Fut: Future<Output = Result<T, NodeClientError>>,
{
    let mut skip_ids: HashSet<String> = HashSet::new();

    for attempt in 1..=max_attempts {
        let Some(locked) = broker
            .lock_available_node(model, version.clone(), skip_ids.clone())
            .await?
        else {
            return Err(LockRetryError::NoNodeAvailable {
                model: model.to_owned(),
            });
        };
        let node_id = locked.view.config.id.clone();

        match f(locked).await {
            Ok(value) => {
                broker.release_node(&node_id, ReleaseOutcome::Success).await;
                return Ok(value);
            }
            Err(err) if err.is_transport() => {
                warn!(node_id = %node_id, attempt, %err, "transport failure on locked node");
                // Release triggers a status re-query for the failed node.
                broker
                    .release_node(&node_id, ReleaseOutcome::TransportError)
                    .await;
                skip_ids.insert(node_id);
            }
            Err(err) => {
                debug!(node_id = %node_id, %err, "application error on locked node");
                broker.release_node(&node_id, ReleaseOutcome::Success).await;
                return Err(LockRetryError::Application(err));
            }
        }
    }

    Err(LockRetryError::AttemptsExhausted {
        attempts: max_attempts,
    })
}
