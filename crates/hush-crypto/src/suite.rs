//! Envelope suites behind one interface.
//!
//! Each suite version is its own `Sealer` implementation. Callers pick one
//! at startup through [`build_sealer`] and never branch on the suite again.

use hush_core::{HushError, HushResult, SuiteKind};
use rsa::RsaPublicKey;

use crate::identity::{derive_vault_identifier, fingerprint};
use crate::transfer::{self, TransferKey};
use crate::vault::{self, VaultKeyPair};

/// What a caller shows the user after sealing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SealSummary {
    /// The recipient needs this exported key
    Transfer { key: String },
    /// Sealed for a vault key
    Vault {
        fingerprint: String,
        vault_id: String,
    },
}

pub trait Sealer: Send + Sync {
    fn kind(&self) -> SuiteKind;

    fn seal(&self, plaintext: &[u8]) -> HushResult<Vec<u8>>;

    fn open(&self, envelope: &[u8]) -> HushResult<Vec<u8>>;

    fn summary(&self) -> HushResult<SealSummary>;
}

/// v1 transfer suite: AES-256-GCM under an exportable key
pub struct TransferSealer {
    key: TransferKey,
}

impl TransferSealer {
    pub fn new(key: TransferKey) -> Self {
        Self { key }
    }
}

impl Sealer for TransferSealer {
    fn kind(&self) -> SuiteKind {
        SuiteKind::Transfer
    }

    fn seal(&self, plaintext: &[u8]) -> HushResult<Vec<u8>> {
        transfer::encrypt(&self.key, plaintext)
    }

    fn open(&self, envelope: &[u8]) -> HushResult<Vec<u8>> {
        transfer::decrypt(&self.key, envelope)
    }

    fn summary(&self) -> HushResult<SealSummary> {
        Ok(SealSummary::Transfer {
            key: transfer::export_key(&self.key),
        })
    }
}

/// v1 vault suite: RSA-OAEP wrapped AES-256-GCM
///
/// Seal-only when constructed from a bare public key.
pub struct VaultSealer {
    public: RsaPublicKey,
    pair: Option<VaultKeyPair>,
}

impl VaultSealer {
    pub fn for_recipient(public: RsaPublicKey) -> Self {
        Self { public, pair: None }
    }

    pub fn for_owner(pair: VaultKeyPair) -> Self {
        Self {
            public: pair.public_key().clone(),
            pair: Some(pair),
        }
    }
}

impl Sealer for VaultSealer {
    fn kind(&self) -> SuiteKind {
        SuiteKind::Vault
    }

    fn seal(&self, plaintext: &[u8]) -> HushResult<Vec<u8>> {
        vault::encrypt(&self.public, plaintext)
    }

    fn open(&self, envelope: &[u8]) -> HushResult<Vec<u8>> {
        let pair = self.pair.as_ref().ok_or_else(|| {
            HushError::MalformedKey("vault sealer has no private key to open with".into())
        })?;
        vault::decrypt(pair, envelope)
    }

    fn summary(&self) -> HushResult<SealSummary> {
        Ok(SealSummary::Vault {
            fingerprint: fingerprint(&self.public)?.into_string(),
            vault_id: derive_vault_identifier(&self.public)?.to_string(),
        })
    }
}

/// Key material a suite may need; only the part matching the kind is used.
#[derive(Default)]
pub struct SuiteKeys {
    pub transfer: Option<TransferKey>,
    pub vault: Option<VaultKeyPair>,
}

/// Pick the active suite.
pub fn build_sealer(kind: SuiteKind, keys: SuiteKeys) -> HushResult<Box<dyn Sealer>> {
    tracing::debug!(suite = ?kind, "selecting envelope suite");
    match kind {
        SuiteKind::Transfer => {
            let key = keys
                .transfer
                .ok_or_else(|| HushError::MalformedKey("transfer suite needs a key".into()))?;
            Ok(Box::new(TransferSealer::new(key)))
        }
        SuiteKind::Vault => {
            let pair = keys
                .vault
                .ok_or_else(|| HushError::MalformedKey("vault suite needs a key pair".into()))?;
            Ok(Box::new(VaultSealer::for_owner(pair)))
        }
    }
}
