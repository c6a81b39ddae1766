//! Participant key handling and signing.

use std::path::PathBuf;

use k256::ecdsa::{signature::Signer as _, Signature, SigningKey};
use sha2::{Digest, Sha256};

use crate::ChainError;

/// Signing handle for the configured API key.
///
/// ECDSA over secp256k1 with a SHA-256 prehash, matching the chain's
/// account keys.
#[derive(Debug, Clone)]
pub struct Signer {
    key: SigningKey,
    address: String,
}

impl Signer {
    pub fn new(key: SigningKey, address: impl Into<String>) -> Self {
        Self {
            key,
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Compressed SEC1 public key bytes.
    pub fn pubkey_bytes(&self) -> Vec<u8> {
        self.key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    /// Signs arbitrary bytes, returning the 64-byte compact signature.
    pub fn sign(&self, bytes: &[u8]) -> Vec<u8> {
        let signature: Signature = self.key.sign(bytes);
        signature.to_vec()
    }

    /// Signs the big-endian encoding of an epoch seed, hex encoded.
    pub fn sign_seed(&self, seed: i64) -> String {
        hex::encode(self.sign(&seed.to_be_bytes()))
    }

    /// Headers proving this participant requested an executor payload.
    pub fn payload_request_headers(&self, inference_id: &str, timestamp: i64) -> Vec<(String, String)> {
        let mut hasher = Sha256::new();
        hasher.update(inference_id.as_bytes());
        hasher.update(timestamp.to_be_bytes());
        let digest = hasher.finalize();
        vec![
            ("X-Requester-Address".to_owned(), self.address.clone()),
            ("X-Timestamp".to_owned(), timestamp.to_string()),
            (
                "X-Requester-Signature".to_owned(),
                hex::encode(self.sign(&digest)),
            ),
        ]
    }
}

/// File-backed keyring: one hex-encoded secp256k1 key per file, laid out as
/// `<dir>/keyring-<backend>/<name>.hex`.
#[derive(Debug, Clone)]
pub struct FileKeyring {
    dir: PathBuf,
    backend: String,
}

impl FileKeyring {
    pub fn new(dir: impl Into<PathBuf>, backend: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            backend: backend.into(),
        }
    }

    pub fn load(&self, name: &str) -> Result<SigningKey, ChainError> {
        let backend = if self.backend.is_empty() {
            "test"
        } else {
            &self.backend
        };
        let path = self.dir.join(format!("keyring-{backend}")).join(format!("{name}.hex"));
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            ChainError::Keyring(format!("cannot read key '{}': {e}", path.display()))
        })?;
        let bytes = hex::decode(raw.trim())
            .map_err(|e| ChainError::Keyring(format!("key '{name}' is not hex: {e}")))?;
        SigningKey::from_slice(&bytes)
            .map_err(|e| ChainError::Keyring(format!("key '{name}' is invalid: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signer() -> Signer {
        let key = SigningKey::from_slice(&[7u8; 32]).unwrap();
        Signer::new(key, "part1api")
    }

    #[test]
    fn seed_signature_is_deterministic_hex() {
        let signer = test_signer();
        let a = signer.sign_seed(12345);
        let b = signer.sign_seed(12345);
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        assert!(hex::decode(&a).is_ok());
    }

    #[test]
    fn keyring_loads_hex_key() {
        let dir = tempfile::tempdir().unwrap();
        let keydir = dir.path().join("keyring-test");
        std::fs::create_dir_all(&keydir).unwrap();
        std::fs::write(keydir.join("api.hex"), hex::encode([7u8; 32])).unwrap();

        let keyring = FileKeyring::new(dir.path(), "test");
        let key = keyring.load("api").unwrap();
        assert_eq!(key.to_bytes().as_slice(), &[7u8; 32]);
    }

    #[test]
    fn keyring_missing_key_errors() {
        let dir = tempfile::tempdir().unwrap();
        let keyring = FileKeyring::new(dir.path(), "test");
        assert!(matches!(keyring.load("nope"), Err(ChainError::Keyring(_))));
    }
}
