//! hush-crypto: client-side encryption for hushdrop
//!
//! Nothing in this crate talks to a server. Plaintext and private keys only
//! exist on the client.
//!
//! Envelopes:
//! ```text
//! Transfer (ad-hoc share):
//!   [IV 12][AES-256-GCM ciphertext][tag 16]          key = 32 random bytes, base64url
//!
//! Vault item (persistent, per recipient key pair):
//!   [u32 LE wrapLen][RSA-OAEP-SHA256(item key)][IV 12][ciphertext][tag 16]
//! ```
//!
//! Identity:
//! ```text
//! fingerprint = "sha256:" + hex(SHA256(SPKI))[..16]
//! vault id    = hex(SHA256(hex(SHA256(SPKI))[..32] || VAULT_ID_DOMAIN))[..32]
//! ```

pub mod codec;
pub mod identity;
pub mod keyring;
pub mod suite;
pub mod transfer;
pub mod vault;

pub use identity::{
    derive_vault_identifier, fingerprint, fingerprint_pem, public_key_from_pem, public_key_to_pem,
    Fingerprint, VaultIdentifier, VAULT_ID_DOMAIN,
};
pub use keyring::{KeyPairInfo, Keyring};
pub use suite::{build_sealer, SealSummary, Sealer, SuiteKeys, TransferSealer, VaultSealer};
pub use transfer::{export_key, generate_key, import_key, ShareLink, TransferKey};
pub use vault::{algorithm_label, VaultKeyPair};

pub use rsa::RsaPublicKey;

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM IV (96-bit)
pub const IV_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Keeps unit tests fast; production pairs use the configured size.
#[cfg(test)]
pub(crate) const TEST_RSA_BITS: usize = 2048;
