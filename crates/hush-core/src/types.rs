use serde::{Deserialize, Serialize};
use std::fmt;

/// A directory action recorded in the transparency log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogAction {
    Publish,
    Unpublish,
}

impl LogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogAction::Publish => "publish",
            LogAction::Unpublish => "unpublish",
        }
    }
}

impl fmt::Display for LogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One immutable entry of the key transparency log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// 1-based, gap-free sequence number
    pub seq: u64,
    pub action: LogAction,
    /// Canonical (lower-case) lookup code
    pub code: String,
    pub fingerprint: String,
    /// `entry_hash` of the previous entry, or the genesis value for seq 1
    pub prev_hash: String,
    /// Hex SHA-256 over the canonical encoding of the other fields
    pub entry_hash: String,
    /// RFC 3339, UTC
    pub timestamp: String,
}

/// The currently published key material for one lookup code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub code: String,
    /// SPKI PEM
    pub public_key: String,
    #[serde(default)]
    pub signing_key: Option<String>,
    pub fingerprint: String,
    pub algorithm: String,
    pub created: String,
}

/// Returned by the directory after a successful publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub code: String,
    pub fingerprint: String,
}

/// A directory record imported into local contacts under a chosen label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub label: String,
    pub code: String,
    pub public_key: String,
    #[serde(default)]
    pub signing_key: Option<String>,
    pub fingerprint: String,
    pub imported: String,
}

/// Canonical form of a lookup code: lower-case, no whitespace anywhere.
pub fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Display form of a lookup code (upper-case).
pub fn display_code(code: &str) -> String {
    normalize_code(code).to_uppercase()
}
