//! Port for named blobs: system documents and append-only activity logs.
use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Failures surfaced by blob adapters.
    pub enum BlobStoreError {
        /// Backing store could not be reached.
        Unavailable { message: String } => "blob store unavailable: {message}",
        /// Path is not acceptable to the adapter.
        InvalidPath { path: String } => "invalid blob path: {path}",
        /// Read or write failed.
        Io { message: String } => "blob io failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read a whole blob; `None` when it does not exist.
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, BlobStoreError>;

    /// Create or overwrite a blob.
    async fn write(&self, path: &str, contents: &[u8]) -> Result<(), BlobStoreError>;

    /// Append to a blob, creating it when absent.
    async fn append(&self, path: &str, contents: &[u8]) -> Result<(), BlobStoreError>;
}
