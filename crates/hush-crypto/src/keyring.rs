//! Persistence of vault key pairs in the local store.
//!
//! One active pair per identity id. Generating again overwrites the stored
//! pair, which invalidates every fingerprint shared from the old one, so
//! callers should check `has_key_pair()` first.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use hush_core::store::{get_typed, list_typed, put_typed, KEYPAIR_STORE};
use hush_core::{HushConfig, HushError, HushResult, LocalStore};

use crate::identity::public_key_to_pem;
use crate::vault::{algorithm_label, VaultKeyPair};

/// Stored form of a key pair. The private key never leaves the local store.
#[derive(Serialize, Deserialize)]
struct StoredKeyPair {
    id: String,
    algorithm: String,
    public_key: String,
    private_key: String,
    fingerprint: String,
    created: String,
}

impl Drop for StoredKeyPair {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

/// Public summary of a stored key pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPairInfo {
    pub id: String,
    pub algorithm: String,
    pub fingerprint: String,
    pub created: String,
}

pub struct Keyring<S> {
    store: S,
    id: String,
    bits: usize,
}

impl<S: LocalStore> Keyring<S> {
    pub fn new(store: S, id: impl Into<String>, bits: usize) -> Self {
        Self {
            store,
            id: id.into(),
            bits,
        }
    }

    pub fn from_config(store: S, config: &HushConfig) -> Self {
        Self::new(store, config.store.key_pair_id.clone(), config.crypto.rsa_bits)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Generate a key pair and persist it immediately, replacing any
    /// existing pair under this id.
    pub fn generate_key_pair(&self) -> HushResult<VaultKeyPair> {
        if let Some(previous) = self.info()? {
            tracing::warn!(
                id = %self.id,
                old_fingerprint = %previous.fingerprint,
                "overwriting existing vault key pair; previously shared fingerprints become invalid"
            );
        }

        let pair = VaultKeyPair::generate(self.bits)?;
        let fingerprint = pair.fingerprint()?;
        let private_pem = pair.to_pkcs8_pem()?;
        let stored = StoredKeyPair {
            id: self.id.clone(),
            algorithm: algorithm_label(pair.public_key()),
            public_key: public_key_to_pem(pair.public_key())?,
            private_key: private_pem.as_str().to_owned(),
            fingerprint: fingerprint.to_string(),
            created: chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        put_typed(&self.store, KEYPAIR_STORE, &self.id, &stored)?;

        tracing::info!(id = %self.id, fingerprint = %fingerprint, bits = self.bits, "vault key pair created");
        Ok(pair)
    }

    pub fn get_key_pair(&self) -> HushResult<Option<VaultKeyPair>> {
        let Some(stored) = get_typed::<_, StoredKeyPair>(&self.store, KEYPAIR_STORE, &self.id)?
        else {
            return Ok(None);
        };

        let pair = VaultKeyPair::from_pkcs8_pem(&stored.private_key)?;
        let actual = pair.fingerprint()?;
        if actual.as_str() != stored.fingerprint {
            return Err(HushError::FingerprintMismatch {
                expected: stored.fingerprint.clone(),
                actual: actual.into_string(),
            });
        }
        Ok(Some(pair))
    }

    pub fn has_key_pair(&self) -> HushResult<bool> {
        Ok(self.store.get(KEYPAIR_STORE, &self.id)?.is_some())
    }

    /// Public summary of the pair under this id, without loading the private key.
    pub fn info(&self) -> HushResult<Option<KeyPairInfo>> {
        Ok(get_typed::<_, StoredKeyPair>(&self.store, KEYPAIR_STORE, &self.id)?
            .map(|stored| stored.info()))
    }

    /// Summaries of every stored pair, across all ids.
    pub fn list(&self) -> HushResult<Vec<KeyPairInfo>> {
        Ok(list_typed::<_, StoredKeyPair>(&self.store, KEYPAIR_STORE)?
            .iter()
            .map(StoredKeyPair::info)
            .collect())
    }

    /// Explicit user deletion. Published log entries are not retracted.
    pub fn delete_key_pair(&self) -> HushResult<bool> {
        let removed = self.store.delete(KEYPAIR_STORE, &self.id)?;
        if removed {
            tracing::info!(id = %self.id, "vault key pair deleted");
        }
        Ok(removed)
    }
}

impl StoredKeyPair {
    fn info(&self) -> KeyPairInfo {
        KeyPairInfo {
            id: self.id.clone(),
            algorithm: self.algorithm.clone(),
            fingerprint: self.fingerprint.clone(),
            created: self.created.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TEST_RSA_BITS;
    use hush_core::MemoryStore;
    use std::sync::Arc;

    fn keyring(store: Arc<MemoryStore>, id: &str) -> Keyring<Arc<MemoryStore>> {
        Keyring::new(store, id, TEST_RSA_BITS)
    }

    #[test]
    fn test_absent_until_generated() {
        let ring = keyring(Arc::new(MemoryStore::new()), "vault-identity");
        assert!(!ring.has_key_pair().unwrap());
        assert!(ring.get_key_pair().unwrap().is_none());
        assert!(ring.info().unwrap().is_none());
    }

    #[test]
    fn test_generate_persists_immediately() {
        let store = Arc::new(MemoryStore::new());
        let ring = keyring(store.clone(), "vault-identity");
        let pair = ring.generate_key_pair().unwrap();

        // A second keyring over the same store sees the pair
        let other = keyring(store, "vault-identity");
        assert!(other.has_key_pair().unwrap());
        let loaded = other.get_key_pair().unwrap().unwrap();
        assert_eq!(loaded.fingerprint().unwrap(), pair.fingerprint().unwrap());

        let info = other.info().unwrap().unwrap();
        assert_eq!(info.fingerprint, pair.fingerprint().unwrap().as_str());
        assert_eq!(info.algorithm, format!("RSA-OAEP-{TEST_RSA_BITS}-SHA256"));
    }

    #[test]
    fn test_created_is_utc_millis() {
        let ring = keyring(Arc::new(MemoryStore::new()), "vault-identity");
        ring.generate_key_pair().unwrap();

        let created = ring.info().unwrap().unwrap().created;
        // 2026-01-01T00:00:00.000Z
        assert_eq!(created.len(), 24, "{created}");
        assert!(created.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&created).is_ok());
    }

    #[test]
    fn test_regenerate_overwrites() {
        let ring = keyring(Arc::new(MemoryStore::new()), "vault-identity");
        let first = ring.generate_key_pair().unwrap();
        let second = ring.generate_key_pair().unwrap();

        let loaded = ring.get_key_pair().unwrap().unwrap();
        assert_ne!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
        assert_eq!(loaded.fingerprint().unwrap(), second.fingerprint().unwrap());
        assert_eq!(ring.list().unwrap().len(), 1);
    }

    #[test]
    fn test_multiple_ids_independent() {
        let store = Arc::new(MemoryStore::new());
        let work = keyring(store.clone(), "work");
        let home = keyring(store.clone(), "home");
        work.generate_key_pair().unwrap();
        home.generate_key_pair().unwrap();

        assert_eq!(work.list().unwrap().len(), 2);
        assert!(work.delete_key_pair().unwrap());
        assert!(!work.has_key_pair().unwrap());
        assert!(home.has_key_pair().unwrap());
    }

    #[test]
    fn test_corrupted_fingerprint_detected() {
        let store = Arc::new(MemoryStore::new());
        let ring = keyring(store.clone(), "vault-identity");
        ring.generate_key_pair().unwrap();

        let mut value = store.get(KEYPAIR_STORE, "vault-identity").unwrap().unwrap();
        value["fingerprint"] = serde_json::json!("sha256:0000000000000000");
        store.put(KEYPAIR_STORE, "vault-identity", value).unwrap();

        assert!(matches!(
            ring.get_key_pair(),
            Err(HushError::FingerprintMismatch { .. })
        ));
    }
}
