//! Directory transport: the client's view of the key directory server.
//!
//! Implementations own the wire (HTTP, in-process, ...). They report
//! unreachable servers as `HushError::Network` and auth or quota rejections
//! as `HushError::AccessDenied`.

use async_trait::async_trait;
use std::sync::Arc;

use hush_core::{DirectoryRecord, HushResult, PublishReceipt};

use crate::log::LogView;

#[async_trait]
pub trait DirectoryTransport: Send + Sync {
    /// Publish a public key (and optional signing key); the server assigns a code.
    async fn publish(
        &self,
        public_key_pem: &str,
        signing_key_pem: Option<&str>,
    ) -> HushResult<PublishReceipt>;

    /// `code` is already canonical.
    async fn lookup(&self, code: &str) -> HushResult<DirectoryRecord>;

    async fn unpublish(&self, code: &str) -> HushResult<()>;

    /// Currently published records only.
    async fn list(&self) -> HushResult<Vec<DirectoryRecord>>;

    async fn log(&self) -> HushResult<LogView>;
}

#[async_trait]
impl<T: DirectoryTransport + ?Sized> DirectoryTransport for Arc<T> {
    async fn publish(
        &self,
        public_key_pem: &str,
        signing_key_pem: Option<&str>,
    ) -> HushResult<PublishReceipt> {
        (**self).publish(public_key_pem, signing_key_pem).await
    }

    async fn lookup(&self, code: &str) -> HushResult<DirectoryRecord> {
        (**self).lookup(code).await
    }

    async fn unpublish(&self, code: &str) -> HushResult<()> {
        (**self).unpublish(code).await
    }

    async fn list(&self) -> HushResult<Vec<DirectoryRecord>> {
        (**self).list().await
    }

    async fn log(&self) -> HushResult<LogView> {
        (**self).log().await
    }
}
