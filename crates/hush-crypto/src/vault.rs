//! Hybrid vault envelope: RSA-OAEP(SHA-256) wrapped AES-256-GCM.
//!
//! Envelope format (binary):
//! ```text
//! [4 bytes: wrapped key length, u32 LE]
//! [wrapLen bytes: ephemeral AES key, RSA-OAEP encrypted]
//! [12 bytes: random IV][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! The length prefix is stored rather than derived from the modulus, so a
//! reader does not need to know the recipient's key size up front.

use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

use hush_core::config::MIN_RSA_BITS;
use hush_core::{HushError, HushResult};

use crate::codec::{pack_u32_le, read_u32_le, take};
use crate::identity::{derive_vault_identifier, fingerprint, Fingerprint, VaultIdentifier};
use crate::transfer::{generate_key, open_aead, seal_aead};
use crate::{IV_SIZE, KEY_SIZE, TAG_SIZE};

/// An RSA key pair for the vault. The private half stays local.
#[derive(Clone)]
pub struct VaultKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl VaultKeyPair {
    /// Generate a fresh key pair with the given modulus size.
    pub fn generate(bits: usize) -> HushResult<Self> {
        if bits < MIN_RSA_BITS {
            return Err(HushError::MalformedKey(format!(
                "RSA modulus of {bits} bits is below the minimum of {MIN_RSA_BITS}"
            )));
        }
        tracing::debug!(bits, "generating RSA key pair");
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
            .map_err(|e| anyhow::anyhow!("RSA key generation failed: {e}"))?;
        Ok(Self::from_private(private))
    }

    pub fn from_private(private: RsaPrivateKey) -> Self {
        let public = private.to_public_key();
        Self { private, public }
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.public.size() * 8
    }

    pub fn fingerprint(&self) -> HushResult<Fingerprint> {
        fingerprint(&self.public)
    }

    pub fn vault_identifier(&self) -> HushResult<VaultIdentifier> {
        derive_vault_identifier(&self.public)
    }

    /// PKCS#8 PEM of the private key, for the local store only.
    pub(crate) fn to_pkcs8_pem(&self) -> HushResult<Zeroizing<String>> {
        self.private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| HushError::MalformedKey(format!("PKCS#8 encoding: {e}")))
    }

    pub(crate) fn from_pkcs8_pem(pem: &str) -> HushResult<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| HushError::MalformedKey(format!("PKCS#8 decoding: {e}")))?;
        Ok(Self::from_private(private))
    }
}

impl fmt::Debug for VaultKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultKeyPair")
            .field("bits", &self.bits())
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// Algorithm label published alongside a public key.
pub fn algorithm_label(public_key: &RsaPublicKey) -> String {
    format!("RSA-OAEP-{}-SHA256", public_key.size() * 8)
}

/// Encrypt a vault item for the holder of `public_key`.
pub fn encrypt(public_key: &RsaPublicKey, plaintext: &[u8]) -> HushResult<Vec<u8>> {
    let item_key = generate_key();
    let body = seal_aead(item_key.as_bytes(), plaintext)?;

    let wrapped = public_key
        .encrypt(
            &mut rand::thread_rng(),
            Oaep::new::<Sha256>(),
            item_key.as_bytes(),
        )
        .map_err(|e| anyhow::anyhow!("RSA-OAEP key wrap failed: {e}"))?;
    let wrap_len = u32::try_from(wrapped.len())
        .map_err(|_| anyhow::anyhow!("wrapped key of {} bytes overflows u32", wrapped.len()))?;

    let mut out = Vec::with_capacity(4 + wrapped.len() + body.len());
    pack_u32_le(&mut out, wrap_len);
    out.extend_from_slice(&wrapped);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decrypt a vault envelope produced by [`encrypt`].
pub fn decrypt(key_pair: &VaultKeyPair, envelope: &[u8]) -> HushResult<Vec<u8>> {
    let (wrap_len, rest) = read_u32_le(envelope)?;
    let (wrapped, body) = take(rest, wrap_len as usize)?;
    if body.len() < IV_SIZE + TAG_SIZE {
        return Err(HushError::MalformedEnvelope(format!(
            "{} bytes after wrapped key, need at least {}",
            body.len(),
            IV_SIZE + TAG_SIZE
        )));
    }

    let mut raw = key_pair
        .private
        .decrypt(Oaep::new::<Sha256>(), wrapped)
        .map_err(|_| HushError::UnwrapFailed)?;
    if raw.len() != KEY_SIZE {
        raw.zeroize();
        return Err(HushError::UnwrapFailed);
    }

    let mut item_key = [0u8; KEY_SIZE];
    item_key.copy_from_slice(&raw);
    raw.zeroize();

    let result = open_aead(&item_key, body);
    item_key.zeroize();
    result
}

/// Serialize a typed vault item to JSON and seal it.
pub fn seal_json<T: Serialize>(public_key: &RsaPublicKey, item: &T) -> HushResult<Vec<u8>> {
    let mut json = serde_json::to_vec(item)?;
    let sealed = encrypt(public_key, &json);
    json.zeroize();
    sealed
}

/// Open a sealed vault item and deserialize it.
pub fn open_json<T: DeserializeOwned>(key_pair: &VaultKeyPair, envelope: &[u8]) -> HushResult<T> {
    let mut json = decrypt(key_pair, envelope)?;
    let item = serde_json::from_slice(&json);
    json.zeroize();
    Ok(item?)
}
