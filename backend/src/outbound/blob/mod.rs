//! Blob storage adapters.
//!
//! - [`MemoryBlobStore`]: process memory, for development and tests.
//! - [`DirBlobStore`]: a capability-scoped directory on local disk.

mod dir;
mod memory;

pub use dir::DirBlobStore;
pub use memory::MemoryBlobStore;

use crate::domain::ports::BlobStoreError;

/// Reject paths that are empty, absolute, or climb out of the root.
fn validate_path(path: &str) -> Result<(), BlobStoreError> {
    let climbs = path.split('/').any(|segment| segment == "..");
    if path.is_empty() || path.starts_with('/') || path.contains('\\') || climbs {
        return Err(BlobStoreError::invalid_path(path));
    }
    Ok(())
}
