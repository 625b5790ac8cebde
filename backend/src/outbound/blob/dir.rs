//! Blob store rooted in a local directory.
//!
//! All access goes through a `cap_std` [`Dir`] handle, so blob paths cannot
//! reach outside the configured root. Filesystem calls are blocking and run
//! on the blocking pool.

use std::io::{ErrorKind, Write};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cap_std::ambient_authority;
use cap_std::fs::{Dir, OpenOptions};

use super::validate_path;
use crate::domain::ports::{BlobStore, BlobStoreError};

/// Blob store over a capability-scoped directory.
#[derive(Debug, Clone)]
pub struct DirBlobStore {
    root: Arc<Dir>,
}

fn io_error(path: &str, err: &std::io::Error) -> BlobStoreError {
    BlobStoreError::io(format!("{path}: {err}"))
}

fn ensure_parent(dir: &Dir, path: &str) -> Result<(), BlobStoreError> {
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        dir.create_dir_all(parent)
            .map_err(|err| io_error(path, &err))?;
    }
    Ok(())
}

impl DirBlobStore {
    /// Open `root`, creating it when missing.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, BlobStoreError> {
        let root = root.as_ref();
        let display = root.display().to_string();
        Dir::create_ambient_dir_all(root, ambient_authority())
            .map_err(|err| BlobStoreError::unavailable(format!("{display}: {err}")))?;
        let dir = Dir::open_ambient_dir(root, ambient_authority())
            .map_err(|err| BlobStoreError::unavailable(format!("{display}: {err}")))?;
        Ok(Self {
            root: Arc::new(dir),
        })
    }

    async fn run<T, F>(&self, path: &str, op: F) -> Result<T, BlobStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Dir, &str) -> Result<T, BlobStoreError> + Send + 'static,
    {
        validate_path(path)?;
        let root = Arc::clone(&self.root);
        let owned = path.to_owned();
        tokio::task::spawn_blocking(move || op(&root, &owned))
            .await
            .map_err(|err| BlobStoreError::io(format!("blob task failed: {err}")))?
    }
}

#[async_trait]
impl BlobStore for DirBlobStore {
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, BlobStoreError> {
        self.run(path, |dir, path| match dir.read(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(path, &err)),
        })
        .await
    }

    async fn write(&self, path: &str, contents: &[u8]) -> Result<(), BlobStoreError> {
        let contents = contents.to_vec();
        self.run(path, move |dir, path| {
            ensure_parent(dir, path)?;
            dir.write(path, &contents).map_err(|err| io_error(path, &err))
        })
        .await
    }

    async fn append(&self, path: &str, contents: &[u8]) -> Result<(), BlobStoreError> {
        let contents = contents.to_vec();
        self.run(path, move |dir, path| {
            ensure_parent(dir, path)?;
            let mut options = OpenOptions::new();
            options.create(true).append(true);
            let mut file = dir
                .open_with(path, &options)
                .map_err(|err| io_error(path, &err))?;
            file.write_all(&contents)
                .map_err(|err| io_error(path, &err))
        })
        .await
    }
}
