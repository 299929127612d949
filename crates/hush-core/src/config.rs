use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HushError, HushResult};

/// Smallest RSA modulus accepted for vault key pairs
pub const MIN_RSA_BITS: usize = 2048;

/// Top-level client configuration (loaded from hush.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HushConfig {
    pub log: LogConfig,
    pub crypto: CryptoConfig,
    pub directory: DirectoryConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

/// Which envelope implementation `encrypt`/`decrypt` use by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuiteKind {
    /// Ad-hoc transfer: AES-256-GCM under an exportable key
    #[default]
    Transfer,
    /// Vault item: RSA-OAEP wrapped AES-256-GCM
    Vault,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// RSA modulus size for new vault key pairs (default: 4096)
    pub rsa_bits: usize,
    /// Active envelope suite
    pub suite: SuiteKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// JSON state file for the local key directory
    pub state_file: PathBuf,
    /// Base URL used when formatting share links
    pub base_url: String,
    /// Recompute every entry hash when verifying the log, not just linkage
    pub strict_log_verification: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding key pairs and contacts
    pub path: PathBuf,
    /// Id under which the vault key pair is persisted
    pub key_pair_id: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            rsa_bits: 4096,
            suite: SuiteKind::Transfer,
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("~/.local/share/hushdrop/directory.json"),
            base_url: "https://hushdrop.example".into(),
            strict_log_verification: true,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.local/share/hushdrop/store"),
            key_pair_id: "vault-identity".into(),
        }
    }
}

impl HushConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> HushResult<Self> {
        let config: HushConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| HushError::Config(format!("parsing {}: {e}", path.display())))?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            HushConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HushResult<()> {
        if self.crypto.rsa_bits < MIN_RSA_BITS {
            return Err(HushError::Config(format!(
                "crypto.rsa_bits = {} is below the minimum of {MIN_RSA_BITS}",
                self.crypto.rsa_bits
            )));
        }
        if self.store.key_pair_id.trim().is_empty() {
            return Err(HushError::Config("store.key_pair_id must not be empty".into()));
        }
        Ok(())
    }

    pub fn store_path(&self) -> PathBuf {
        expand_tilde(&self.store.path)
    }

    pub fn directory_state_path(&self) -> PathBuf {
        expand_tilde(&self.directory.state_file)
    }
}

/// Expand a leading `~/` using `$HOME`.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"));
        return home.join(rest);
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[log]
level = "debug"
format = "json"

[crypto]
rsa_bits = 3072
suite = "vault"

[directory]
state_file = "/tmp/dir.json"
base_url = "https://drop.example.org"
strict_log_verification = false

[store]
path = "/var/lib/hush"
key_pair_id = "work"
"#;
        let config: HushConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
        assert_eq!(config.crypto.rsa_bits, 3072);
        assert_eq!(config.crypto.suite, SuiteKind::Vault);
        assert_eq!(config.directory.state_file, PathBuf::from("/tmp/dir.json"));
        assert!(!config.directory.strict_log_verification);
        assert_eq!(config.store.key_pair_id, "work");
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_defaults() {
        let config: HushConfig = toml::from_str("").unwrap();

        assert_eq!(config.log.level, "info");
        assert_eq!(config.crypto.rsa_bits, 4096);
        assert_eq!(config.crypto.suite, SuiteKind::Transfer);
        assert!(config.directory.strict_log_verification);
        assert_eq!(config.store.key_pair_id, "vault-identity");
    }

    #[test]
    fn test_reject_weak_rsa() {
        let config: HushConfig = toml::from_str("[crypto]\nrsa_bits = 1024\n").unwrap();
        assert!(matches!(config.validate(), Err(HushError::Config(_))));
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HushConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.crypto.rsa_bits, 4096);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hush.toml");
        std::fs::write(&path, "[store]\nkey_pair_id = \"laptop\"\n").unwrap();

        let config = HushConfig::load(&path).unwrap();
        assert_eq!(config.store.key_pair_id, "laptop");
        // Untouched sections keep defaults
        assert_eq!(config.log.format, "text");
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde(Path::new("~/.local/share/hushdrop"));
        assert!(!expanded.to_str().unwrap().starts_with("~/"));
        assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
