//! In-memory blob store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::validate_path;
use crate::domain::ports::{BlobStore, BlobStoreError};

/// Blob store backed by a map of path to bytes.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `(path, contents)` pairs.
    pub fn with_blobs<P, C>(blobs: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<String>,
        C: Into<Vec<u8>>,
    {
        Self {
            blobs: Mutex::new(
                blobs
                    .into_iter()
                    .map(|(path, contents)| (path.into(), contents.into()))
                    .collect(),
            ),
        }
    }

    /// Every stored path, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .blobs
            .lock()
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    fn with_blobs_mut<T>(
        &self,
        apply: impl FnOnce(&mut HashMap<String, Vec<u8>>) -> T,
    ) -> Result<T, BlobStoreError> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| BlobStoreError::unavailable("memory blob store lock poisoned"))?;
        Ok(apply(&mut blobs))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, BlobStoreError> {
        validate_path(path)?;
        self.with_blobs_mut(|blobs| blobs.get(path).cloned())
    }

    async fn write(&self, path: &str, contents: &[u8]) -> Result<(), BlobStoreError> {
        validate_path(path)?;
        self.with_blobs_mut(|blobs| {
            blobs.insert(path.to_owned(), contents.to_vec());
        })
    }

    async fn append(&self, path: &str, contents: &[u8]) -> Result<(), BlobStoreError> {
        validate_path(path)?;
        self.with_blobs_mut(|blobs| {
            blobs
                .entry(path.to_owned())
                .or_default()
                .extend_from_slice(contents);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_creates_then_extends() {
        let store = MemoryBlobStore::new();
        store.append("log/a.log", b"one\n").await.expect("append");
        store.append("log/a.log", b"two\n").await.expect("append");
        let contents = store.read("log/a.log").await.expect("read");
        assert_eq!(contents.as_deref(), Some(&b"one\ntwo\n"[..]));
        assert_eq!(store.read("missing").await.expect("read"), None);
    }

    #[tokio::test]
    async fn seeded_blobs_are_readable() {
        let store = MemoryBlobStore::with_blobs([("metadata.json", "{}")]);
        assert_eq!(store.paths(), vec!["metadata.json".to_owned()]);
        store.write("metadata.json", b"[]").await.expect("write");
        let contents = store.read("metadata.json").await.expect("read");
        assert_eq!(contents.as_deref(), Some(&b"[]"[..]));
    }
}
