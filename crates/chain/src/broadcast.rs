//! Transaction building, signing, and synchronous broadcast.

use std::time::Duration;

use prost::Message as _;
use tracing::debug;

use crate::{proto, ChainError, ChainMsg, RpcClient, Signer};

/// Gas ceiling. Fees are not charged on this chain, so the limit is set far
/// above anything a batch can consume.
const GAS_LIMIT: u64 = 10_000_000_000;

/// How long the synchronous send flavor waits for inclusion.
pub const INCLUSION_WAIT: Duration = Duration::from_secs(15);
const INCLUSION_POLL: Duration = Duration::from_secs(1);

/// Result of a sync broadcast: mempool admission, not inclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastResponse {
    pub code: u32,
    pub log: String,
    pub tx_hash: String,
}

/// Result of a tx lookup after broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxLookup {
    pub code: u32,
    pub log: String,
    pub height: u64,
}

/// Builds, signs, and broadcasts unordered transactions.
#[derive(Debug, Clone)]
pub struct TxBroadcaster {
    rpc: RpcClient,
    signer: Signer,
    chain_id: String,
    /// Main (grantor) account the messages act for.
    account_address: String,
    account_number: u64,
}

impl TxBroadcaster {
    pub fn new(
        rpc: RpcClient,
        signer: Signer,
        chain_id: impl Into<String>,
        account_address: impl Into<String>,
        account_number: u64,
    ) -> Self {
        Self {
            rpc,
            signer,
            chain_id: chain_id.into(),
            account_address: account_address.into(),
            account_number,
        }
    }

    pub fn account_address(&self) -> &str {
        &self.account_address
    }

    fn uses_grantee(&self) -> bool {
        self.signer.address() != self.account_address
    }

    /// Encodes and signs `msgs` into a raw unordered tx expiring at
    /// `timeout_ns` (unix nanos).
    pub fn build_raw_tx(&self, msgs: &[ChainMsg], timeout_ns: u64) -> Result<Vec<u8>, ChainError> {
        if msgs.is_empty() {
            return Err(ChainError::decode("no messages to broadcast"));
        }

        let inner: Vec<proto::Any> = msgs
            .iter()
            .map(|msg| msg.to_any(&self.account_address))
            .collect();

        // The signer key may be a grantee of the main account; wrap in an
        // authz exec so the messages still act for the grantor.
        let messages = if self.uses_grantee() {
            vec![proto::Any::pack(
                proto::MSG_EXEC_TYPE_URL,
                &proto::MsgExec {
                    grantee: self.signer.address().to_owned(),
                    msgs: inner,
                },
            )]
        } else {
            inner
        };

        let body = proto::TxBody {
            messages,
            memo: String::new(),
            timeout_height: 0,
            unordered: true,
            timeout_timestamp: Some(proto::Timestamp {
                seconds: (timeout_ns / 1_000_000_000) as i64,
                nanos: (timeout_ns % 1_000_000_000) as i32,
            }),
        };

        let auth_info = proto::AuthInfo {
            signer_infos: vec![proto::SignerInfo {
                public_key: Some(proto::Any::pack(
                    proto::PUBKEY_TYPE_URL,
                    &proto::PubKey {
                        key: self.signer.pubkey_bytes(),
                    },
                )),
                mode_info: Some(proto::ModeInfo {
                    sum: Some(proto::mode_info::Sum::Single(proto::mode_info::Single {
                        mode: proto::SIGN_MODE_DIRECT,
                    })),
                }),
                // Unordered txs carry no sequence number.
                sequence: 0,
            }],
            fee: Some(proto::Fee {
                amount: vec![],
                gas_limit: GAS_LIMIT,
                payer: String::new(),
                granter: String::new(),
            }),
        };

        let body_bytes = body.encode_to_vec();
        let auth_info_bytes = auth_info.encode_to_vec();

        let sign_doc = proto::SignDoc {
            body_bytes: body_bytes.clone(),
            auth_info_bytes: auth_info_bytes.clone(),
            chain_id: self.chain_id.clone(),
            account_number: self.account_number,
        };
        let signature = self.signer.sign(&sign_doc.encode_to_vec());

        let raw = proto::TxRaw {
            body_bytes,
            auth_info_bytes,
            signatures: vec![signature],
        };
        Ok(raw.encode_to_vec())
    }

    /// Signs and fires the tx; returns mempool admission only.
    pub async fn broadcast(
        &self,
        msgs: &[ChainMsg],
        timeout_ns: u64,
    ) -> Result<BroadcastResponse, ChainError> {
        let raw = self.build_raw_tx(msgs, timeout_ns)?;
        let resp = self.rpc.broadcast_tx_sync(&raw).await?;
        debug!(
            code = resp.code,
            tx_hash = %resp.hash,
            msgs = msgs.len(),
            "broadcast tx"
        );
        Ok(BroadcastResponse {
            code: resp.code,
            log: resp.log,
            tx_hash: resp.hash,
        })
    }

    pub async fn query_tx(&self, tx_hash: &str) -> Result<Option<TxLookup>, ChainError> {
        let Some(resp) = self.rpc.tx(tx_hash).await? else {
            return Ok(None);
        };
        Ok(Some(TxLookup {
            code: resp.tx_result.code,
            log: resp.tx_result.log.clone(),
            height: resp.height_u64()?,
        }))
    }

    /// Polls for inclusion up to [`INCLUSION_WAIT`].
    pub async fn wait_for_inclusion(&self, tx_hash: &str) -> Result<Option<TxLookup>, ChainError> {
        let deadline = tokio::time::Instant::now() + INCLUSION_WAIT;
        loop {
            if let Some(lookup) = self.query_tx(tx_hash).await? {
                return Ok(Some(lookup));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(INCLUSION_POLL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::SigningKey;
    use prost::Message as _;

    use super::*;

    fn broadcaster(signer_addr: &str) -> TxBroadcaster {
        let rpc = RpcClient::new("http://127.0.0.1:1").unwrap();
        let signer = Signer::new(SigningKey::from_slice(&[9u8; 32]).unwrap(), signer_addr);
        TxBroadcaster::new(rpc, signer, "infernet-test", "part1main", 0)
    }

    fn seed_msg() -> ChainMsg {
        ChainMsg::SubmitSeed {
            epoch_index: 3,
            signature: "aa".to_owned(),
        }
    }

    #[test]
    fn grantee_signer_wraps_in_exec() {
        let raw = broadcaster("part1api").build_raw_tx(&[seed_msg()], 1_000).unwrap();
        let tx = proto::TxRaw::decode(raw.as_slice()).unwrap();
        let body = proto::TxBody::decode(tx.body_bytes.as_slice()).unwrap();

        assert!(body.unordered);
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].type_url, proto::MSG_EXEC_TYPE_URL);

        let exec = proto::MsgExec::decode(body.messages[0].value.as_slice()).unwrap();
        assert_eq!(exec.grantee, "part1api");
        assert_eq!(exec.msgs[0].type_url, "/inference.v1.MsgSubmitSeed");
    }

    #[test]
    fn main_signer_submits_directly() {
        let raw = broadcaster("part1main").build_raw_tx(&[seed_msg()], 1_000).unwrap();
        let tx = proto::TxRaw::decode(raw.as_slice()).unwrap();
        let body = proto::TxBody::decode(tx.body_bytes.as_slice()).unwrap();

        assert_eq!(body.messages[0].type_url, "/inference.v1.MsgSubmitSeed");
        assert_eq!(tx.signatures.len(), 1);
        assert_eq!(tx.signatures[0].len(), 64);
    }

    #[test]
    fn fee_is_empty_and_gas_high() {
        let raw = broadcaster("part1main").build_raw_tx(&[seed_msg()], 5).unwrap();
        let tx = proto::TxRaw::decode(raw.as_slice()).unwrap();
        let auth = proto::AuthInfo::decode(tx.auth_info_bytes.as_slice()).unwrap();

        let fee = auth.fee.unwrap();
        assert!(fee.amount.is_empty());
        assert_eq!(fee.gas_limit, GAS_LIMIT);
    }

    #[test]
    fn empty_msg_list_is_rejected() {
        assert!(broadcaster("part1main").build_raw_tx(&[], 1).is_err());
    }
}
