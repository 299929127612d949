//! Client-side key directory workflow.
//!
//! `KeyDirectory` never trusts what the transport says about a key: every
//! fingerprint it hands back is recomputed locally from the PEM it came
//! with, and the log is verified before it is returned.

use chrono::SecondsFormat;

use hush_core::store::{get_typed, list_typed, put_typed, CONTACT_STORE};
use hush_core::{
    normalize_code, Contact, DirectoryRecord, HushConfig, HushError, HushResult, LocalStore,
    LogAction, PublishReceipt,
};
use hush_crypto::{fingerprint_pem, public_key_to_pem, VaultKeyPair};

use crate::log::LogView;
use crate::transport::DirectoryTransport;

pub struct KeyDirectory<T, S> {
    transport: T,
    store: S,
    strict: bool,
}

impl<T: DirectoryTransport, S: LocalStore> KeyDirectory<T, S> {
    pub fn new(transport: T, store: S, strict: bool) -> Self {
        Self {
            transport,
            store,
            strict,
        }
    }

    pub fn from_config(transport: T, store: S, config: &HushConfig) -> Self {
        Self::new(transport, store, config.directory.strict_log_verification)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Publish a public key. The server's fingerprint must match ours.
    pub async fn publish(
        &self,
        public_key_pem: &str,
        signing_key_pem: Option<&str>,
    ) -> HushResult<PublishReceipt> {
        let expected = fingerprint_pem(public_key_pem)?;
        let receipt = self
            .transport
            .publish(public_key_pem, signing_key_pem)
            .await?;

        if receipt.fingerprint != expected.as_str() {
            return Err(HushError::FingerprintMismatch {
                expected: expected.into_string(),
                actual: receipt.fingerprint,
            });
        }

        let code = normalize_code(&receipt.code);
        tracing::info!(code = %code, fingerprint = %receipt.fingerprint, "public key published");
        Ok(PublishReceipt {
            code,
            fingerprint: receipt.fingerprint,
        })
    }

    pub async fn publish_key_pair(
        &self,
        pair: &VaultKeyPair,
        signing_key_pem: Option<&str>,
    ) -> HushResult<PublishReceipt> {
        let pem = public_key_to_pem(pair.public_key())?;
        self.publish(&pem, signing_key_pem).await
    }

    /// Fetch a record by code, rejecting one filed under a different code
    /// or whose key does not hash to its claimed fingerprint.
    pub async fn lookup(&self, code: &str) -> HushResult<DirectoryRecord> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(HushError::NotFound("empty lookup code".into()));
        }

        let mut record = self.transport.lookup(&code).await?;
        let returned = normalize_code(&record.code);
        if returned != code {
            tracing::warn!(requested = %code, returned = %returned, "directory answered a lookup with another code's record");
            return Err(HushError::ChainBroken {
                seq: 0,
                reason: format!("lookup of {code} returned the record for {returned}"),
            });
        }
        record.code = returned;

        let actual = fingerprint_pem(&record.public_key)?;
        if actual.as_str() != record.fingerprint {
            tracing::warn!(code = %code, claimed = %record.fingerprint, actual = %actual, "directory returned a key that does not match its fingerprint");
            return Err(HushError::FingerprintMismatch {
                expected: record.fingerprint,
                actual: actual.into_string(),
            });
        }
        Ok(record)
    }

    /// `lookup` plus a cross-check against the verified log: the latest
    /// entry for the code must publish this exact fingerprint.
    pub async fn lookup_verified(&self, code: &str) -> HushResult<DirectoryRecord> {
        let record = self.lookup(code).await?;
        let view = self.verify_log().await?;

        match view.latest_for(&record.code) {
            Some(entry)
                if entry.action == LogAction::Publish
                    && entry.fingerprint == record.fingerprint =>
            {
                Ok(record)
            }
            Some(entry) => Err(HushError::ChainBroken {
                seq: entry.seq,
                reason: format!(
                    "latest log entry for {} is {} {}, record has {}",
                    record.code, entry.action, entry.fingerprint, record.fingerprint
                ),
            }),
            None => Err(HushError::ChainBroken {
                seq: view.head.as_ref().map(|h| h.seq).unwrap_or(0),
                reason: format!("no log entry for {}", record.code),
            }),
        }
    }

    pub async fn unpublish(&self, code: &str) -> HushResult<()> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(HushError::NotFound("empty lookup code".into()));
        }
        self.transport.unpublish(&code).await?;
        tracing::info!(code = %code, "public key unpublished");
        Ok(())
    }

    /// Published records ordered by creation time, then code.
    pub async fn list(&self) -> HushResult<Vec<DirectoryRecord>> {
        let mut records = self.transport.list().await?;
        records.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.code.cmp(&b.code)));
        Ok(records)
    }

    /// Fetch the log and verify it, strictly or by linkage only.
    pub async fn fetch_log(&self, strict: bool) -> HushResult<LogView> {
        let view = self.transport.log().await?;
        view.verify(strict)?;
        tracing::debug!(entries = view.entries.len(), strict, "transparency log verified");
        Ok(view)
    }

    /// `fetch_log` at the configured strictness.
    pub async fn verify_log(&self) -> HushResult<LogView> {
        self.fetch_log(self.strict).await
    }

    /// Save a looked-up record under a local label. Local only; the log is
    /// not touched. Re-importing a label replaces it.
    pub fn import_to_contacts(&self, record: &DirectoryRecord, label: &str) -> HushResult<Contact> {
        let label = label.trim();
        if label.is_empty() {
            return Err(HushError::Store("contact label must not be empty".into()));
        }

        let actual = fingerprint_pem(&record.public_key)?;
        if actual.as_str() != record.fingerprint {
            return Err(HushError::FingerprintMismatch {
                expected: record.fingerprint.clone(),
                actual: actual.into_string(),
            });
        }

        let contact = Contact {
            label: label.to_string(),
            code: normalize_code(&record.code),
            public_key: record.public_key.clone(),
            signing_key: record.signing_key.clone(),
            fingerprint: record.fingerprint.clone(),
            imported: chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        put_typed(&self.store, CONTACT_STORE, label, &contact)?;

        tracing::info!(label, code = %contact.code, fingerprint = %contact.fingerprint, "contact imported");
        Ok(contact)
    }

    pub fn contacts(&self) -> HushResult<Vec<Contact>> {
        list_typed(&self.store, CONTACT_STORE)
    }

    pub fn contact(&self, label: &str) -> HushResult<Option<Contact>> {
        get_typed(&self.store, CONTACT_STORE, label.trim())
    }
}
