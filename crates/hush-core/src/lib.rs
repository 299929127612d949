//! hush-core: shared types, configuration, errors and the local key store
//! used by every hushdrop crate.

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::{HushConfig, SuiteKind};
pub use error::{HushError, HushResult};
pub use store::{JsonFileStore, LocalStore, MemoryStore};
pub use types::{
    display_code, normalize_code, Contact, DirectoryRecord, LogAction, LogEntry, PublishReceipt,
};
