use thiserror::Error;

pub type HushResult<T> = Result<T, HushError>;

#[derive(Debug, Error)]
pub enum HushError {
    #[error("malformed key: {0}")]
    MalformedKey(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// AEAD tag mismatch. Never distinguished from corruption.
    #[error("wrong decryption key")]
    AuthenticationFailed,

    #[error("key unwrap failed: wrong private key or corrupted envelope")]
    UnwrapFailed,

    #[error("transparency log chain broken at seq {seq}: {reason}")]
    ChainBroken { seq: u64, reason: String },

    #[error("fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch { expected: String, actual: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("local store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HushError {
    /// Only transport failures are worth retrying; the same crypto inputs
    /// always fail the same way.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HushError::Network(_))
    }

    /// Failures that indicate a wrong key or tampering and must be shown
    /// to the user as-is.
    pub fn is_security_warning(&self) -> bool {
        matches!(
            self,
            HushError::AuthenticationFailed
                | HushError::UnwrapFailed
                | HushError::ChainBroken { .. }
                | HushError::FingerprintMismatch { .. }
        )
    }
}
