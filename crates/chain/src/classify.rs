//! Centralized classification of broadcast result codes.

/// ABCI code for a tx already present in the mempool cache.
const CODE_TX_IN_CACHE: u32 = 19;
/// ABCI code for an expired unordered transaction.
const CODE_TX_TIMEOUT: u32 = 30;
/// ABCI code for an account sequence mismatch.
const CODE_SEQUENCE_MISMATCH: u32 = 32;
/// ABCI code for an unauthorized signer.
const CODE_UNAUTHORIZED: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastClass {
    Accepted,
    /// Worth re-broadcasting: duplicate unordered nonce, expired timeout.
    Retryable,
    /// Will never succeed as-is: bad signer, sequence mismatch.
    Critical,
}

pub fn classify_broadcast(code: u32, log: &str) -> BroadcastClass {
    match code {
        0 => BroadcastClass::Accepted,
        CODE_TX_IN_CACHE | CODE_TX_TIMEOUT => BroadcastClass::Retryable,
        CODE_SEQUENCE_MISMATCH | CODE_UNAUTHORIZED => BroadcastClass::Critical,
        _ if log.contains("account sequence mismatch") => BroadcastClass::Critical,
        // Non-zero codes are not critical by default.
        _ => BroadcastClass::Retryable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_classify() {
        assert_eq!(classify_broadcast(0, ""), BroadcastClass::Accepted);
        assert_eq!(classify_broadcast(19, "tx already exists in cache"), BroadcastClass::Retryable);
        assert_eq!(classify_broadcast(30, "tx timeout"), BroadcastClass::Retryable);
        assert_eq!(classify_broadcast(32, ""), BroadcastClass::Critical);
        assert_eq!(classify_broadcast(4, ""), BroadcastClass::Critical);
    }

    #[test]
    fn unknown_nonzero_code_is_retryable() {
        assert_eq!(classify_broadcast(111, "some failure"), BroadcastClass::Retryable);
    }

    #[test]
    fn sequence_mismatch_in_log_is_critical() {
        assert_eq!(
            classify_broadcast(99, "account sequence mismatch, expected 5"),
            BroadcastClass::Critical
        );
    }
}
