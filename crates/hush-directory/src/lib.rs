//! hush-directory: public key directory with a hash-chained transparency log
//!
//! Every publish and unpublish appends one entry to an append-only log:
//! ```text
//! entry_hash = hex(SHA256(json([seq, action, code, fingerprint, prev_hash, timestamp])))
//! prev_hash  = entry_hash of seq-1, or GENESIS_HASH for seq 1
//! ```
//! Clients reach the directory through a [`DirectoryTransport`] and wrap it
//! in a [`KeyDirectory`], which recomputes fingerprints and verifies the log
//! rather than trusting the server.

pub mod log;
pub mod server;
pub mod transport;
pub mod workflow;

pub use log::{
    compute_entry_hash, verify_chain, verify_chain_strict, LogView, TransparencyLog, GENESIS_HASH,
};
pub use server::InMemoryDirectory;
pub use transport::DirectoryTransport;
pub use workflow::KeyDirectory;
