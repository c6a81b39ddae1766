use infernet_chain::ChainMsg;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ceiling on broadcast attempts before an envelope is dropped.
pub const MAX_ATTEMPTS: u32 = 100;

/// One outbox entry. The messages stay in domain form so a re-broadcast can
/// be re-signed with a fresh timeout timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxEnvelope {
    pub id: Uuid,
    pub msgs: Vec<ChainMsg>,
    #[serde(default)]
    pub tx_hash: String,
    /// Unix nanos after which the broadcast tx can no longer be included.
    #[serde(default)]
    pub timeout_ns: u64,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub sent: bool,
}

impl TxEnvelope {
    pub fn new(msgs: Vec<ChainMsg>) -> Self {
        Self {
            id: Uuid::new_v4(),
            msgs,
            tx_hash: String::new(),
            timeout_ns: 0,
            attempts: 0,
            sent: false,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= MAX_ATTEMPTS
    }

    /// Resets broadcast state for another trip through the send stream.
    pub fn requeue_for_send(&mut self) {
        self.attempts += 1;
        self.sent = false;
        self.tx_hash.clear();
        self.timeout_ns = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requeue_resets_broadcast_state() {
        let mut env = TxEnvelope::new(vec![ChainMsg::SubmitSeed {
            epoch_index: 1,
            signature: "aa".into(),
        }]);
        env.sent = true;
        env.tx_hash = "HASH".into();
        env.timeout_ns = 5;

        env.requeue_for_send();
        assert_eq!(env.attempts, 1);
        assert!(!env.sent);
        assert!(env.tx_hash.is_empty());
        assert_eq!(env.timeout_ns, 0);
    }

    #[test]
    fn exhaustion_at_cap() {
        let mut env = TxEnvelope::new(vec![]);
        env.attempts = MAX_ATTEMPTS - 1;
        assert!(!env.exhausted());
        env.requeue_for_send();
        assert!(env.exhausted());
    }
}
