//! Hash-chained transparency log of directory publish/unpublish events.
//!
//! Each entry commits to its predecessor:
//! ```text
//! entry_hash = hex(SHA256(JSON([seq, action, code, fingerprint, prev_hash, timestamp])))
//! prev_hash(1) = GENESIS_HASH,  prev_hash(n) = entry_hash(n-1)
//! ```
//!
//! The hash input is the compact JSON array of those six fields, which is
//! unambiguous whatever the field contents.
//!
//! Writers append under a single lock so `seq` is gap-free and no two
//! entries share a `prev_hash`. Readers verify either linkage only
//! ([`verify_chain`]) or linkage plus hash recomputation
//! ([`verify_chain_strict`]).

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Mutex, MutexGuard};

use hush_core::{HushError, HushResult, LogAction, LogEntry};

/// `prev_hash` of the first entry
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Hash an entry's fields in canonical form.
pub fn compute_entry_hash(
    seq: u64,
    action: LogAction,
    code: &str,
    fingerprint: &str,
    prev_hash: &str,
    timestamp: &str,
) -> HushResult<String> {
    let canonical = serde_json::to_vec(&(
        seq,
        action.as_str(),
        code,
        fingerprint,
        prev_hash,
        timestamp,
    ))?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

/// Recompute the hash a stored entry should carry.
pub fn recompute_entry_hash(entry: &LogEntry) -> HushResult<String> {
    compute_entry_hash(
        entry.seq,
        entry.action,
        &entry.code,
        &entry.fingerprint,
        &entry.prev_hash,
        &entry.timestamp,
    )
}

/// Linkage check: every entry's `prev_hash` equals its predecessor's
/// `entry_hash`. Empty and single-entry logs are valid.
pub fn verify_chain(entries: &[LogEntry]) -> bool {
    entries
        .windows(2)
        .all(|pair| pair[1].prev_hash == pair[0].entry_hash)
}

/// Linkage plus contiguous `seq`, genesis anchoring and recomputed hashes.
///
/// A slice starting at seq 1 must link to [`GENESIS_HASH`]; a slice starting
/// later is checked from its first entry onwards.
pub fn verify_chain_strict(entries: &[LogEntry]) -> HushResult<()> {
    let mut previous: Option<&LogEntry> = None;

    for entry in entries {
        match previous {
            None => {
                if entry.seq == 0 {
                    return Err(broken(entry, "sequence numbers start at 1"));
                }
                if entry.seq == 1 && entry.prev_hash != GENESIS_HASH {
                    return Err(broken(entry, "first entry does not link to genesis"));
                }
            }
            Some(prev) => {
                if prev.seq.checked_add(1) != Some(entry.seq) {
                    return Err(broken(
                        entry,
                        &format!("sequence jumps from {} to {}", prev.seq, entry.seq),
                    ));
                }
                if entry.prev_hash != prev.entry_hash {
                    return Err(broken(entry, "prev_hash does not match previous entry_hash"));
                }
            }
        }

        if recompute_entry_hash(entry)? != entry.entry_hash {
            return Err(broken(entry, "entry_hash does not match entry contents"));
        }
        previous = Some(entry);
    }
    Ok(())
}

fn broken(entry: &LogEntry, reason: &str) -> HushError {
    HushError::ChainBroken {
        seq: entry.seq,
        reason: reason.to_string(),
    }
}

/// The log as served to readers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogView {
    pub entries: Vec<LogEntry>,
    pub head: Option<LogEntry>,
}

impl LogView {
    /// Check `head` against the last entry, then the chain itself.
    pub fn verify(&self, strict: bool) -> HushResult<()> {
        if self.head.as_ref() != self.entries.last() {
            let seq = self.head.as_ref().map(|h| h.seq).unwrap_or(0);
            return Err(HushError::ChainBroken {
                seq,
                reason: "head does not match the last log entry".into(),
            });
        }

        if strict {
            return verify_chain_strict(&self.entries);
        }
        if !verify_chain(&self.entries) {
            let seq = self
                .entries
                .windows(2)
                .find(|pair| pair[1].prev_hash != pair[0].entry_hash)
                .map(|pair| pair[1].seq)
                .unwrap_or(0);
            return Err(HushError::ChainBroken {
                seq,
                reason: "prev_hash does not match previous entry_hash".into(),
            });
        }
        Ok(())
    }

    /// Most recent entry recorded for a (canonical) code.
    pub fn latest_for(&self, code: &str) -> Option<&LogEntry> {
        self.entries.iter().rev().find(|e| e.code == code)
    }

    /// Full history of one code, oldest first.
    pub fn history(&self, code: &str) -> Vec<&LogEntry> {
        self.entries.iter().filter(|e| e.code == code).collect()
    }
}

/// Append-only writer side of the log
#[derive(Debug, Default)]
pub struct TransparencyLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a persisted log, refusing one that fails strict verification.
    pub fn from_entries(entries: Vec<LogEntry>) -> HushResult<Self> {
        if let Some(first) = entries.first() {
            if first.seq != 1 {
                return Err(broken(first, "persisted log does not start at seq 1"));
            }
        }
        verify_chain_strict(&entries)?;
        Ok(Self {
            entries: Mutex::new(entries),
        })
    }

    fn lock(&self) -> HushResult<MutexGuard<'_, Vec<LogEntry>>> {
        self.entries
            .lock()
            .map_err(|_| HushError::Other(anyhow::anyhow!("transparency log lock poisoned")))
    }

    /// Append one entry linked to the current head.
    pub fn append(
        &self,
        action: LogAction,
        code: &str,
        fingerprint: &str,
    ) -> HushResult<LogEntry> {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.append_at(action, code, fingerprint, &timestamp)
    }

    /// Append with an explicit timestamp (restores, imports, tests).
    pub fn append_at(
        &self,
        action: LogAction,
        code: &str,
        fingerprint: &str,
        timestamp: &str,
    ) -> HushResult<LogEntry> {
        let mut entries = self.lock()?;

        let (seq, prev_hash) = match entries.last() {
            Some(head) => {
                let seq = head
                    .seq
                    .checked_add(1)
                    .ok_or_else(|| broken(head, "sequence number exhausted"))?;
                (seq, head.entry_hash.clone())
            }
            None => (1, GENESIS_HASH.to_string()),
        };
        let entry_hash =
            compute_entry_hash(seq, action, code, fingerprint, &prev_hash, timestamp)?;

        let entry = LogEntry {
            seq,
            action,
            code: code.to_string(),
            fingerprint: fingerprint.to_string(),
            prev_hash,
            entry_hash,
            timestamp: timestamp.to_string(),
        };
        entries.push(entry.clone());

        tracing::info!(
            seq,
            action = %action,
            code,
            fingerprint,
            "transparency log entry appended"
        );
        Ok(entry)
    }

    /// Drop entries past `len`. Only for undoing an append whose
    /// surrounding state change could not be stored.
    pub(crate) fn truncate_to(&self, len: usize) -> HushResult<()> {
        let mut entries = self.lock()?;
        if len < entries.len() {
            tracing::warn!(from = entries.len(), to = len, "rolling back transparency log");
            entries.truncate(len);
        }
        Ok(())
    }

    pub fn entries(&self) -> HushResult<Vec<LogEntry>> {
        Ok(self.lock()?.clone())
    }

    pub fn head(&self) -> HushResult<Option<LogEntry>> {
        Ok(self.lock()?.last().cloned())
    }

    pub fn len(&self) -> HushResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> HushResult<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// Whether a code has ever appeared in the log.
    pub fn contains_code(&self, code: &str) -> HushResult<bool> {
        Ok(self.lock()?.iter().any(|e| e.code == code))
    }

    /// Consistent snapshot for readers.
    pub fn view(&self) -> HushResult<LogView> {
        let entries = self.lock()?.clone();
        let head = entries.last().cloned();
        Ok(LogView { entries, head })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    const FP: &str = "sha256:aaaaaaaaaaaaaaaa";

    fn scenario_c() -> Vec<LogEntry> {
        let log = TransparencyLog::new();
        log.append(LogAction::Publish, "ab-1234", FP).unwrap();
        log.append(LogAction::Unpublish, "ab-1234", FP).unwrap();
        log.entries().unwrap()
    }

    #[test]
    fn test_empty_and_single_entry_valid() {
        assert!(verify_chain(&[]));
        verify_chain_strict(&[]).unwrap();

        let log = TransparencyLog::new();
        let entry = log.append(LogAction::Publish, "ab-1234", FP).unwrap();
        assert!(verify_chain(std::slice::from_ref(&entry)));
        verify_chain_strict(&[entry]).unwrap();
    }

    #[test]
    fn test_first_entry_links_to_genesis() {
        let log = TransparencyLog::new();
        let entry = log.append(LogAction::Publish, "ab-1234", FP).unwrap();
        assert_eq!(entry.seq, 1);
        assert_eq!(entry.prev_hash, GENESIS_HASH);
        assert_eq!(entry.entry_hash.len(), 64);
    }

    #[test]
    fn test_scenario_publish_then_unpublish() {
        let entries = scenario_c();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, LogAction::Publish);
        assert_eq!(entries[1].action, LogAction::Unpublish);
        assert_eq!(entries[1].prev_hash, entries[0].entry_hash);
        assert!(verify_chain(&entries));
        verify_chain_strict(&entries).unwrap();
    }

    #[test]
    fn test_scenario_corrupted_first_hash() {
        let mut entries = scenario_c();
        entries[0].entry_hash = "f".repeat(64);
        assert!(!verify_chain(&entries));
        assert!(matches!(
            verify_chain_strict(&entries),
            Err(HushError::ChainBroken { seq: 1, .. })
        ));
    }

    #[test]
    fn test_mutated_middle_links_break() {
        let log = TransparencyLog::new();
        for i in 0..5 {
            let action = if i % 2 == 0 {
                LogAction::Publish
            } else {
                LogAction::Unpublish
            };
            log.append(action, "ab-1234", FP).unwrap();
        }
        let entries = log.entries().unwrap();
        assert!(verify_chain(&entries));

        let mut bad_entry_hash = entries.clone();
        bad_entry_hash[2].entry_hash = "0".repeat(64);
        assert!(!verify_chain(&bad_entry_hash));

        let mut bad_prev_hash = entries.clone();
        bad_prev_hash[2].prev_hash = "1".repeat(64);
        assert!(!verify_chain(&bad_prev_hash));
    }

    #[test]
    fn test_strict_catches_forged_field() {
        let mut entries = scenario_c();
        // Linkage survives, contents do not match the hash
        entries[1].fingerprint = "sha256:bbbbbbbbbbbbbbbb".into();
        assert!(verify_chain(&entries));
        assert!(matches!(
            verify_chain_strict(&entries),
            Err(HushError::ChainBroken { seq: 2, .. })
        ));
    }

    #[test]
    fn test_strict_catches_sequence_gap() {
        let log = TransparencyLog::new();
        for _ in 0..3 {
            log.append(LogAction::Publish, "cd-5678", FP).unwrap();
        }
        let mut entries = log.entries().unwrap();
        entries.remove(1);
        assert!(matches!(
            verify_chain_strict(&entries),
            Err(HushError::ChainBroken { seq: 3, .. })
        ));
    }

    fn linked_entry(seq: u64, prev_hash: &str) -> LogEntry {
        let timestamp = "2026-01-01T00:00:00.000Z";
        let entry_hash =
            compute_entry_hash(seq, LogAction::Publish, "ab-1234", FP, prev_hash, timestamp)
                .unwrap();
        LogEntry {
            seq,
            action: LogAction::Publish,
            code: "ab-1234".into(),
            fingerprint: FP.into(),
            prev_hash: prev_hash.into(),
            entry_hash,
            timestamp: timestamp.into(),
        }
    }

    #[test]
    fn test_strict_rejects_seq_overflow() {
        let last = linked_entry(u64::MAX, &"a".repeat(64));
        let wrapped = linked_entry(0, &last.entry_hash);
        let entries = vec![last, wrapped];

        assert!(verify_chain(&entries));
        assert!(matches!(
            verify_chain_strict(&entries),
            Err(HushError::ChainBroken { seq: 0, .. })
        ));
    }

    #[test]
    fn test_append_after_max_seq_fails() {
        let log = TransparencyLog {
            entries: Mutex::new(vec![linked_entry(u64::MAX, &"a".repeat(64))]),
        };
        assert!(matches!(
            log.append(LogAction::Unpublish, "ab-1234", FP),
            Err(HushError::ChainBroken { seq: u64::MAX, .. })
        ));
        assert_eq!(log.len().unwrap(), 1);
    }

    #[test]
    fn test_strict_accepts_suffix() {
        let log = TransparencyLog::new();
        for _ in 0..4 {
            log.append(LogAction::Publish, "cd-5678", FP).unwrap();
        }
        let entries = log.entries().unwrap();
        verify_chain_strict(&entries[2..]).unwrap();
    }

    #[test]
    fn test_canonical_hash_is_stable() {
        let hash = compute_entry_hash(
            1,
            LogAction::Publish,
            "ab-1234",
            FP,
            GENESIS_HASH,
            "2026-01-01T00:00:00.000Z",
        )
        .unwrap();
        let canonical = format!(
            r#"[1,"publish","ab-1234","{FP}","{GENESIS_HASH}","2026-01-01T00:00:00.000Z"]"#
        );
        assert_eq!(hash, hex::encode(Sha256::digest(canonical.as_bytes())));
    }

    #[test]
    fn test_view_head_matches_last() {
        let log = TransparencyLog::new();
        assert_eq!(log.view().unwrap(), LogView::default());

        log.append(LogAction::Publish, "ab-1234", FP).unwrap();
        let last = log.append(LogAction::Unpublish, "ab-1234", FP).unwrap();
        let view = log.view().unwrap();
        assert_eq!(view.head.as_ref(), Some(&last));
        view.verify(true).unwrap();
        view.verify(false).unwrap();
    }

    #[test]
    fn test_view_head_mismatch() {
        let log = TransparencyLog::new();
        let first = log.append(LogAction::Publish, "ab-1234", FP).unwrap();
        log.append(LogAction::Unpublish, "ab-1234", FP).unwrap();

        let mut view = log.view().unwrap();
        view.head = Some(first);
        assert!(matches!(view.verify(false), Err(HushError::ChainBroken { .. })));

        let mut headless = log.view().unwrap();
        headless.head = None;
        assert!(headless.verify(false).is_err());
    }

    #[test]
    fn test_view_history() {
        let log = TransparencyLog::new();
        log.append(LogAction::Publish, "ab-1234", FP).unwrap();
        log.append(LogAction::Publish, "cd-5678", FP).unwrap();
        log.append(LogAction::Unpublish, "ab-1234", FP).unwrap();

        let view = log.view().unwrap();
        assert_eq!(view.history("ab-1234").len(), 2);
        assert_eq!(view.latest_for("ab-1234").unwrap().action, LogAction::Unpublish);
        assert_eq!(view.latest_for("cd-5678").unwrap().seq, 2);
        assert!(view.latest_for("zz-0000").is_none());
    }

    #[test]
    fn test_from_entries_rejects_tampering() {
        let entries = scenario_c();
        let restored = TransparencyLog::from_entries(entries.clone()).unwrap();
        let next = restored
            .append(LogAction::Publish, "ab-1234", FP)
            .unwrap();
        assert_eq!(next.seq, 3);
        assert_eq!(next.prev_hash, entries[1].entry_hash);

        let mut tampered = entries;
        tampered[0].code = "zz-9999".into();
        assert!(TransparencyLog::from_entries(tampered).is_err());
    }

    #[test]
    fn test_concurrent_appends_are_linearized() {
        let log = Arc::new(TransparencyLog::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let action = if t % 2 == 0 {
                            LogAction::Publish
                        } else {
                            LogAction::Unpublish
                        };
                        log.append(action, &format!("t{t}-code"), FP).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 200);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.seq, i as u64 + 1);
        }
        verify_chain_strict(&entries).unwrap();
    }

    proptest! {
        #[test]
        fn appends_are_gap_free(actions in proptest::collection::vec(any::<bool>(), 1..40)) {
            let log = TransparencyLog::new();
            for publish in &actions {
                let action = if *publish { LogAction::Publish } else { LogAction::Unpublish };
                log.append(action, "ab-1234", FP).unwrap();
            }
            let entries = log.entries().unwrap();
            for (i, entry) in entries.iter().enumerate() {
                prop_assert_eq!(entry.seq, i as u64 + 1);
            }
            prop_assert!(verify_chain(&entries));
            prop_assert!(verify_chain_strict(&entries).is_ok());
        }
    }
}
