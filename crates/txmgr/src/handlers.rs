//! Send/observe handler state machines.

use std::time::Duration;

use infernet_chain::{classify_broadcast, BroadcastClass, ChainError};
use tracing::{debug, warn};

use crate::{manager::TxManagerInner, TxEnvelope, TxError};

/// What the consumer does with a delivered envelope.
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Done with this delivery; drop it from the stream.
    Acknowledge,
    /// Leave it in place and try again after the delay.
    Redeliver(Duration),
    /// Unrecoverable; drop it and log why.
    Terminate(String),
}

impl TxManagerInner {
    /// One trip through the send stream.
    pub(crate) async fn handle_send(&self, mut envelope: TxEnvelope) -> Verdict {
        if self.tracker.is_halted() {
            return Verdict::Redeliver(self.config.halt_retry);
        }
        let Some(timeout_ns) = self.next_timeout_ns() else {
            // No block observed yet; cannot stamp a validity window.
            return Verdict::Redeliver(self.config.halt_retry);
        };

        if !envelope.sent {
            let response = match self
                .broadcaster
                .broadcast(envelope.msgs.clone(), timeout_ns)
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    warn!(tx_id = %envelope.id, %err, "broadcast transport failure");
                    return Verdict::Redeliver(self.config.halt_retry);
                }
            };

            match classify_broadcast(response.code, &response.log) {
                BroadcastClass::Critical => {
                    return Verdict::Terminate(format!(
                        "critical code {}: {}",
                        response.code, response.log
                    ));
                }
                BroadcastClass::Retryable => {
                    debug!(tx_id = %envelope.id, code = response.code, "broadcast retryable");
                    return Verdict::Redeliver(self.config.halt_retry);
                }
                BroadcastClass::Accepted => {
                    envelope.sent = true;
                    envelope.tx_hash = response.tx_hash;
                    envelope.timeout_ns = timeout_ns;
                }
            }
        }

        if let Err(err) = self.observe.push(&envelope) {
            warn!(tx_id = %envelope.id, %err, "cannot move envelope to observe stream");
            return Verdict::Redeliver(self.config.halt_retry);
        }
        Verdict::Acknowledge
    }

    /// One trip through the observe stream.
    pub(crate) async fn handle_observe(&self, mut envelope: TxEnvelope) -> Verdict {
        if envelope.tx_hash.is_empty() {
            return self.requeue_or_terminate(&mut envelope);
        }

        match self.broadcaster.query_tx(envelope.tx_hash.clone()).await {
            Ok(Some(lookup)) => {
                debug!(
                    tx_id = %envelope.id,
                    height = lookup.height,
                    code = lookup.code,
                    "tx included"
                );
                Verdict::Acknowledge
            }
            Err(ChainError::Decode(reason)) => {
                Verdict::Terminate(format!("undecodable tx lookup: {reason}"))
            }
            Err(err) => {
                warn!(tx_id = %envelope.id, %err, "tx lookup failed");
                Verdict::Redeliver(self.config.observe_poll)
            }
            Ok(None) => {
                let expired = self
                    .latest_block_time_ns()
                    .is_some_and(|now_ns| now_ns > envelope.timeout_ns);
                if expired {
                    debug!(tx_id = %envelope.id, "broadcast expired without inclusion");
                    self.requeue_or_terminate(&mut envelope)
                } else {
                    Verdict::Redeliver(self.config.observe_poll)
                }
            }
        }
    }

    /// Sends an envelope back through the send stream, counting the attempt.
    fn requeue_or_terminate(&self, envelope: &mut TxEnvelope) -> Verdict {
        envelope.requeue_for_send();
        if envelope.exhausted() {
            return Verdict::Terminate(format!("attempts exhausted ({})", envelope.attempts));
        }
        match self.send.push(envelope) {
            Ok(()) => Verdict::Acknowledge,
            Err(err) => {
                warn!(tx_id = %envelope.id, %err, "cannot requeue envelope");
                Verdict::Redeliver(self.config.observe_poll)
            }
        }
    }
}
