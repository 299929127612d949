//! Public key fingerprints and vault identifiers.
//!
//! Both are pure functions of the SPKI DER encoding of an RSA public key, so
//! two keys agree on a fingerprint iff their encodings are byte-identical.

use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use hush_core::{HushError, HushResult};

use crate::codec::hex_prefix;

/// Domain-separation suffix mixed into the vault identifier derivation
pub const VAULT_ID_DOMAIN: &str = "hushdrop-vault-v1";

const FINGERPRINT_PREFIX: &str = "sha256:";
const FINGERPRINT_HEX_LEN: usize = 16;
const VAULT_ID_HEX_LEN: usize = 32;

/// `sha256:` followed by the first 16 hex chars of SHA-256(SPKI)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 32 lowercase hex chars, derived deterministically from a public key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultIdentifier(String);

impl VaultIdentifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VaultIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SPKI DER bytes of a public key: the canonical form for hashing.
pub fn spki_der(public_key: &RsaPublicKey) -> HushResult<Vec<u8>> {
    let doc = public_key
        .to_public_key_der()
        .map_err(|e| HushError::MalformedKey(format!("SPKI encoding: {e}")))?;
    Ok(doc.as_bytes().to_vec())
}

pub fn public_key_to_pem(public_key: &RsaPublicKey) -> HushResult<String> {
    public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| HushError::MalformedKey(format!("SPKI PEM encoding: {e}")))
}

pub fn public_key_from_pem(pem: &str) -> HushResult<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem.trim())
        .map_err(|e| HushError::MalformedKey(format!("SPKI PEM decoding: {e}")))
}

pub fn fingerprint(public_key: &RsaPublicKey) -> HushResult<Fingerprint> {
    let digest = Sha256::digest(spki_der(public_key)?);
    Ok(Fingerprint(format!(
        "{FINGERPRINT_PREFIX}{}",
        hex_prefix(&digest, FINGERPRINT_HEX_LEN)
    )))
}

/// Fingerprint of a PEM-encoded public key.
pub fn fingerprint_pem(pem: &str) -> HushResult<Fingerprint> {
    fingerprint(&public_key_from_pem(pem)?)
}

pub fn derive_vault_identifier(public_key: &RsaPublicKey) -> HushResult<VaultIdentifier> {
    let key_hash = hex_prefix(&Sha256::digest(spki_der(public_key)?), VAULT_ID_HEX_LEN);

    let mut hasher = Sha256::new();
    hasher.update(key_hash.as_bytes());
    hasher.update(VAULT_ID_DOMAIN.as_bytes());
    Ok(VaultIdentifier(hex_prefix(
        &hasher.finalize(),
        VAULT_ID_HEX_LEN,
    )))
}
