//! In-process key directory: the server-side collaborator.
//!
//! Holds the published records and the transparency log. Every mutation
//! takes the records lock, changes the record set, appends to the log and
//! (when backed by a state file) persists before releasing it, so record
//! state and log order always agree. A mutation that cannot be persisted is
//! undone in memory before the error is returned.

use async_trait::async_trait;
use chrono::SecondsFormat;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use hush_core::{
    normalize_code, DirectoryRecord, HushError, HushResult, LogAction, LogEntry, PublishReceipt,
};
use hush_crypto::{algorithm_label, fingerprint, public_key_from_pem};

use crate::log::{LogView, TransparencyLog};
use crate::transport::DirectoryTransport;

/// Lookup code alphabet: lower-case alphanumerics minus `0 o 1 l i`
const CODE_ALPHABET: &[u8] = b"abcdefghjkmnpqrstuvwxyz23456789";
const MAX_CODE_ATTEMPTS: usize = 64;

#[derive(Debug, Default, Serialize, Deserialize)]
struct DirectorySnapshot {
    records: Vec<DirectoryRecord>,
    log: Vec<LogEntry>,
}

type RecordMap = BTreeMap<String, DirectoryRecord>;

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    records: Mutex<RecordMap>,
    log: TransparencyLog,
    state_path: Option<PathBuf>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a directory persisted at `path`, creating it on first write.
    ///
    /// The stored log must verify strictly, and every stored record must be
    /// the latest published state of its code in that log.
    pub fn open(path: &Path) -> HushResult<Self> {
        let snapshot: DirectorySnapshot = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            DirectorySnapshot::default()
        };

        let log = TransparencyLog::from_entries(snapshot.log)?;
        let view = log.view()?;
        let mut records = RecordMap::new();
        for record in snapshot.records {
            match view.latest_for(&record.code) {
                Some(entry)
                    if entry.action == LogAction::Publish
                        && entry.fingerprint == record.fingerprint => {}
                other => {
                    return Err(HushError::ChainBroken {
                        seq: other.map(|e| e.seq).unwrap_or(0),
                        reason: format!("record {} is not backed by the log", record.code),
                    })
                }
            }
            records.insert(record.code.clone(), record);
        }

        tracing::debug!(
            path = %path.display(),
            records = records.len(),
            log_entries = view.entries.len(),
            "directory state loaded"
        );
        Ok(Self {
            records: Mutex::new(records),
            log,
            state_path: Some(path.to_path_buf()),
        })
    }

    pub fn transparency_log(&self) -> &TransparencyLog {
        &self.log
    }

    fn lock(&self) -> HushResult<MutexGuard<'_, RecordMap>> {
        self.records
            .lock()
            .map_err(|_| HushError::Other(anyhow::anyhow!("directory lock poisoned")))
    }

    fn persist(&self, records: &RecordMap) -> HushResult<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let snapshot = DirectorySnapshot {
            records: records.values().cloned().collect(),
            log: self.log.entries()?,
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        // Atomic write: write to temp file, then rename
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Draw a fresh `xx-xxxx` code never used before, live or historical.
    fn assign_code(&self, records: &RecordMap) -> HushResult<String> {
        let mut rng = rand::thread_rng();
        let mut draw = |n: usize| -> String {
            (0..n)
                .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
                .collect()
        };

        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = format!("{}-{}", draw(2), draw(4));
            if !records.contains_key(&code) && !self.log.contains_code(&code)? {
                return Ok(code);
            }
        }
        Err(HushError::Other(anyhow::anyhow!(
            "no free lookup code after {MAX_CODE_ATTEMPTS} attempts"
        )))
    }

    pub fn publish_record(
        &self,
        public_key_pem: &str,
        signing_key_pem: Option<&str>,
    ) -> HushResult<PublishReceipt> {
        let public_key = public_key_from_pem(public_key_pem)?;
        let fingerprint = fingerprint(&public_key)?.into_string();

        let mut records = self.lock()?;
        let code = self.assign_code(&records)?;
        let record = DirectoryRecord {
            code: code.clone(),
            public_key: public_key_pem.trim().to_string(),
            signing_key: signing_key_pem.map(|k| k.trim().to_string()),
            fingerprint: fingerprint.clone(),
            algorithm: algorithm_label(&public_key),
            created: chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let log_len = self.log.len()?;
        records.insert(code.clone(), record);
        let stored = self
            .log
            .append(LogAction::Publish, &code, &fingerprint)
            .and_then(|_| self.persist(&records));
        if let Err(e) = stored {
            records.remove(&code);
            self.log.truncate_to(log_len)?;
            return Err(e);
        }

        Ok(PublishReceipt { code, fingerprint })
    }

    pub fn lookup_record(&self, code: &str) -> HushResult<DirectoryRecord> {
        let code = normalize_code(code);
        self.lock()?
            .get(&code)
            .cloned()
            .ok_or(HushError::NotFound(code))
    }

    /// Removes the record and logs the unpublish. An absent code is
    /// `NotFound` and leaves the log untouched.
    pub fn unpublish_record(&self, code: &str) -> HushResult<()> {
        let code = normalize_code(code);
        let mut records = self.lock()?;
        let record = records
            .remove(&code)
            .ok_or_else(|| HushError::NotFound(code.clone()))?;

        let log_len = self.log.len()?;
        let stored = self
            .log
            .append(LogAction::Unpublish, &code, &record.fingerprint)
            .and_then(|_| self.persist(&records));
        if let Err(e) = stored {
            records.insert(code, record);
            self.log.truncate_to(log_len)?;
            return Err(e);
        }
        Ok(())
    }

    /// Published records ordered by creation time, then code.
    pub fn records(&self) -> HushResult<Vec<DirectoryRecord>> {
        let mut list: Vec<DirectoryRecord> = self.lock()?.values().cloned().collect();
        list.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.code.cmp(&b.code)));
        Ok(list)
    }
}

#[async_trait]
impl DirectoryTransport for InMemoryDirectory {
    async fn publish(
        &self,
        public_key_pem: &str,
        signing_key_pem: Option<&str>,
    ) -> HushResult<PublishReceipt> {
        self.publish_record(public_key_pem, signing_key_pem)
    }

    async fn lookup(&self, code: &str) -> HushResult<DirectoryRecord> {
        self.lookup_record(code)
    }

    async fn unpublish(&self, code: &str) -> HushResult<()> {
        self.unpublish_record(code)
    }

    async fn list(&self) -> HushResult<Vec<DirectoryRecord>> {
        self.records()
    }

    async fn log(&self) -> HushResult<LogView> {
        self.log.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hush_crypto::{public_key_to_pem, VaultKeyPair};
    use std::sync::OnceLock;

    fn test_pem() -> &'static str {
        static PEM: OnceLock<String> = OnceLock::new();
        PEM.get_or_init(|| {
            let pair = VaultKeyPair::generate(2048).unwrap();
            public_key_to_pem(pair.public_key()).unwrap()
        })
    }

    fn is_valid_code(code: &str) -> bool {
        let bytes = code.as_bytes();
        bytes.len() == 7
            && bytes[2] == b'-'
            && bytes
                .iter()
                .enumerate()
                .all(|(i, b)| i == 2 || CODE_ALPHABET.contains(b))
    }

    #[test]
    fn test_publish_assigns_code_and_logs() {
        let dir = InMemoryDirectory::new();
        let receipt = dir.publish_record(test_pem(), None).unwrap();

        assert!(is_valid_code(&receipt.code), "bad code {}", receipt.code);
        assert!(receipt.fingerprint.starts_with("sha256:"));

        let entries = dir.transparency_log().entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, LogAction::Publish);
        assert_eq!(entries[0].code, receipt.code);
        assert_eq!(entries[0].fingerprint, receipt.fingerprint);
    }

    #[test]
    fn test_lookup_normalizes_code() {
        let dir = InMemoryDirectory::new();
        let receipt = dir.publish_record(test_pem(), Some("signing-pem")).unwrap();

        let shouted = format!("  {} ", receipt.code.to_uppercase());
        let record = dir.lookup_record(&shouted).unwrap();
        assert_eq!(record.code, receipt.code);
        assert_eq!(record.signing_key.as_deref(), Some("signing-pem"));
        assert_eq!(record.algorithm, "RSA-OAEP-2048-SHA256");
    }

    #[test]
    fn test_unpublish_removes_and_logs() {
        let dir = InMemoryDirectory::new();
        let receipt = dir.publish_record(test_pem(), None).unwrap();

        dir.unpublish_record(&receipt.code).unwrap();
        assert!(matches!(
            dir.lookup_record(&receipt.code),
            Err(HushError::NotFound(_))
        ));

        let entries = dir.transparency_log().entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].action, LogAction::Unpublish);
        assert_eq!(entries[1].fingerprint, receipt.fingerprint);
    }

    #[test]
    fn test_unpublish_absent_leaves_log_untouched() {
        let dir = InMemoryDirectory::new();
        let receipt = dir.publish_record(test_pem(), None).unwrap();
        dir.unpublish_record(&receipt.code).unwrap();

        assert!(matches!(
            dir.unpublish_record(&receipt.code),
            Err(HushError::NotFound(_))
        ));
        assert_eq!(dir.transparency_log().len().unwrap(), 2);
    }

    #[test]
    fn test_publish_rejects_garbage_key() {
        let dir = InMemoryDirectory::new();
        assert!(matches!(
            dir.publish_record("not a key", None),
            Err(HushError::MalformedKey(_))
        ));
        assert!(dir.transparency_log().is_empty().unwrap());
    }

    #[test]
    fn test_persistence_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state/directory.json");

        let (kept, dropped) = {
            let dir = InMemoryDirectory::open(&path).unwrap();
            let kept = dir.publish_record(test_pem(), None).unwrap();
            let dropped = dir.publish_record(test_pem(), None).unwrap();
            dir.unpublish_record(&dropped.code).unwrap();
            (kept, dropped)
        };

        let reopened = InMemoryDirectory::open(&path).unwrap();
        assert_eq!(reopened.records().unwrap().len(), 1);
        assert!(reopened.lookup_record(&kept.code).is_ok());
        assert!(reopened.lookup_record(&dropped.code).is_err());
        assert_eq!(reopened.transparency_log().len().unwrap(), 3);

        // Appends continue the restored chain
        reopened.publish_record(test_pem(), None).unwrap();
        let entries = reopened.transparency_log().entries().unwrap();
        assert_eq!(entries[3].seq, 4);
        assert_eq!(entries[3].prev_hash, entries[2].entry_hash);
    }

    #[test]
    fn test_failed_persist_rolls_back_publish() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("directory.json");
        let dir = InMemoryDirectory::open(&path).unwrap();

        // The state file can no longer be replaced
        std::fs::create_dir_all(&path).unwrap();
        assert!(dir.publish_record(test_pem(), None).is_err());

        assert!(dir.records().unwrap().is_empty());
        assert!(dir.transparency_log().is_empty().unwrap());
    }

    #[test]
    fn test_failed_persist_rolls_back_unpublish() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("directory.json");
        let dir = InMemoryDirectory::open(&path).unwrap();
        let receipt = dir.publish_record(test_pem(), None).unwrap();

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir_all(&path).unwrap();
        assert!(dir.unpublish_record(&receipt.code).is_err());

        assert_eq!(dir.lookup_record(&receipt.code).unwrap().fingerprint, receipt.fingerprint);
        let entries = dir.transparency_log().entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, LogAction::Publish);

        // Once storage recovers the chain continues from the surviving head
        std::fs::remove_dir(&path).unwrap();
        dir.unpublish_record(&receipt.code).unwrap();
        let entries = dir.transparency_log().entries().unwrap();
        assert_eq!(entries[1].seq, 2);
        assert_eq!(entries[1].prev_hash, entries[0].entry_hash);
    }

    #[test]
    fn test_open_rejects_unbacked_record() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("directory.json");
        {
            let dir = InMemoryDirectory::open(&path).unwrap();
            dir.publish_record(test_pem(), None).unwrap();
        }

        let mut snapshot: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        snapshot["records"][0]["fingerprint"] = serde_json::json!("sha256:ffffffffffffffff");
        std::fs::write(&path, snapshot.to_string()).unwrap();

        assert!(matches!(
            InMemoryDirectory::open(&path),
            Err(HushError::ChainBroken { .. })
        ));
    }
}
