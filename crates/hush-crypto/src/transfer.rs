//! Symmetric transfer cipher: AES-256-GCM under an ephemeral exportable key.
//!
//! Envelope format (binary):
//! ```text
//! [12 bytes: random IV][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! The key is shared out-of-band as 43 base64url characters, typically in
//! the fragment of a share link so it never reaches the server.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

use hush_core::{HushError, HushResult};

use crate::codec::{b64url_decode, b64url_encode};
use crate::{IV_SIZE, KEY_SIZE, TAG_SIZE};

/// A 256-bit AES-GCM transfer key. Zeroized on drop.
#[derive(Clone)]
pub struct TransferKey {
    bytes: [u8; KEY_SIZE],
}

impl TransferKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for TransferKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit transfer key.
pub fn generate_key() -> TransferKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    TransferKey::from_bytes(bytes)
}

/// Export the raw key as base64url without padding (43 chars).
pub fn export_key(key: &TransferKey) -> String {
    b64url_encode(key.as_bytes())
}

/// Import a key exported by [`export_key`].
pub fn import_key(encoded: &str) -> HushResult<TransferKey> {
    let mut raw = b64url_decode(encoded)?;
    if raw.len() != KEY_SIZE {
        let len = raw.len();
        raw.zeroize();
        return Err(HushError::MalformedKey(format!(
            "transfer key must be {KEY_SIZE} bytes, got {len}"
        )));
    }
    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&raw);
    raw.zeroize();
    Ok(TransferKey::from_bytes(bytes))
}

/// Encrypt a blob. Returns `[12-byte IV][ciphertext][16-byte tag]`.
pub fn encrypt(key: &TransferKey, plaintext: &[u8]) -> HushResult<Vec<u8>> {
    seal_aead(key.as_bytes(), plaintext)
}

/// Decrypt an envelope produced by [`encrypt`].
///
/// Truncated input, a wrong key and tampered bytes all fail with
/// `AuthenticationFailed`.
pub fn decrypt(key: &TransferKey, envelope: &[u8]) -> HushResult<Vec<u8>> {
    open_aead(key.as_bytes(), envelope)
}

/// AES-256-GCM with a fresh random IV prepended to the output.
pub(crate) fn seal_aead(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> HushResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());

    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| anyhow::anyhow!("AES-GCM encryption failed: {e}"))?;

    let mut out = Vec::with_capacity(IV_SIZE + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub(crate) fn open_aead(key: &[u8; KEY_SIZE], data: &[u8]) -> HushResult<Vec<u8>> {
    if data.len() < IV_SIZE + TAG_SIZE {
        tracing::debug!(len = data.len(), "envelope shorter than IV + tag");
        return Err(HushError::AuthenticationFailed);
    }

    let (iv, ciphertext) = data.split_at(IV_SIZE);
    let cipher = Aes256Gcm::new(key.into());

    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| HushError::AuthenticationFailed)
}

/// A share link carrying the transfer id in the path and the key in the
/// URL fragment: `<base>/t/<transfer_id>#<key>`.
#[derive(Debug, Clone)]
pub struct ShareLink {
    pub base_url: String,
    pub transfer_id: String,
    pub key: TransferKey,
}

impl ShareLink {
    pub fn new(base_url: &str, transfer_id: &str, key: TransferKey) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transfer_id: transfer_id.to_string(),
            key,
        }
    }
}

impl fmt::Display for ShareLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/t/{}#{}",
            self.base_url,
            self.transfer_id,
            export_key(&self.key)
        )
    }
}

impl FromStr for ShareLink {
    type Err = HushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (location, fragment) = s
            .trim()
            .split_once('#')
            .ok_or_else(|| HushError::MalformedKey("share link has no key fragment".into()))?;
        let (base_url, transfer_id) = location
            .rsplit_once("/t/")
            .ok_or_else(|| HushError::MalformedKey(format!("no transfer id in link: {location}")))?;
        if transfer_id.is_empty() {
            return Err(HushError::MalformedKey("empty transfer id in share link".into()));
        }
        Ok(ShareLink::new(base_url, transfer_id, import_key(fragment)?))
    }
}
