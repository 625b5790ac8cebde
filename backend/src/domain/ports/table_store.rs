//! Port for partitioned entity tables with optimistic concurrency.
//!
//! Records are addressed by partition key plus row key and carry an opaque
//! property bag. Every committed write yields a fresh [`ETag`]; conditional
//! merges compare it against the stored value and fail with
//! [`StoreError::PreconditionFailed`] when another writer got there first.
//!
//! The partition is the atomicity boundary. [`TableStore::batch`] applies a
//! list of operations all-or-nothing, but only within one partition.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::define_port_error;

define_port_error! {
    /// Failures surfaced by table adapters.
    pub enum StoreError {
        /// Write target does not exist.
        NotFound { message: String } => "entity not found: {message}",
        /// Insert collided with an existing partition and row key.
        Duplicate { message: String } => "entity already exists: {message}",
        /// Concurrency token did not match the stored record.
        PreconditionFailed { message: String } => "entity was modified concurrently: {message}",
        /// Network or availability fault; safe to retry.
        Transient { message: String } => "table store unavailable: {message}",
        /// Non-retryable fault.
        Fatal { message: String } => "table store failure: {message}",
    }
}

/// Named tables in the account store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Email identities keyed by normalised address.
    Email,
    /// User accounts keyed by encoded identifier.
    User,
    /// Singleton system settings.
    System,
}

impl Table {
    /// Storage name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::User => "user",
            Self::System => "system",
        }
    }
}

/// Opaque concurrency token. `*` matches any stored value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ETag(String);

impl ETag {
    const WILDCARD: &'static str = "*";

    /// Wrap a token produced by an adapter.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Token that forces the write regardless of the stored value.
    pub fn any() -> Self {
        Self(Self::WILDCARD.to_owned())
    }

    /// True for the wildcard token.
    pub fn is_any(&self) -> bool {
        self.0 == Self::WILDCARD
    }

    /// True when this token permits a write over `stored`.
    pub fn permits(&self, stored: &Self) -> bool {
        self.is_any() || self == stored
    }

    /// Raw token text.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Partition plus row key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    /// Partition key; the atomicity boundary.
    pub partition: String,
    /// Row key within the partition.
    pub row: String,
}

impl EntityKey {
    /// Build a key from its parts.
    pub fn new(partition: impl Into<String>, row: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            row: row.into(),
        }
    }
}

/// One stored entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    /// Address of the record.
    pub key: EntityKey,
    /// Uninterpreted property bag.
    pub properties: Map<String, Value>,
    /// Token observed on read; `None` for records not yet written.
    pub etag: Option<ETag>,
}

impl EntityRecord {
    /// Build a record that has not been read from storage.
    pub fn new(key: EntityKey, properties: Map<String, Value>) -> Self {
        Self {
            key,
            properties,
            etag: None,
        }
    }
}

/// One step of a [`TableStore::batch`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum TableOperation {
    /// Insert; fails on an existing key.
    Insert(EntityRecord),
    /// Overwrite every property; fails when absent.
    Replace(EntityRecord),
    /// Update the supplied properties when the token matches.
    Merge {
        /// Partial record.
        record: EntityRecord,
        /// Expected token.
        etag: ETag,
    },
    /// Remove one record when the token matches.
    Delete {
        /// Target key.
        key: EntityKey,
        /// Expected token.
        etag: ETag,
    },
}

impl TableOperation {
    /// Key the operation targets.
    pub fn key(&self) -> &EntityKey {
        match self {
            Self::Insert(record) | Self::Replace(record) | Self::Merge { record, .. } => {
                &record.key
            }
            Self::Delete { key, .. } => key,
        }
    }
}

/// Uninterpreted key/value access to partitioned tables.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Insert a new record, failing with `Duplicate` when the key exists.
    async fn insert(&self, table: Table, record: EntityRecord) -> Result<ETag, StoreError>;

    /// Overwrite every property of an existing record.
    async fn replace(&self, table: Table, record: EntityRecord) -> Result<ETag, StoreError>;

    /// Update only the supplied properties when `etag` matches the stored
    /// token.
    async fn merge(
        &self,
        table: Table,
        record: EntityRecord,
        etag: ETag,
    ) -> Result<ETag, StoreError>;

    /// Point read.
    async fn query_by_key(
        &self,
        table: Table,
        key: &EntityKey,
    ) -> Result<Option<EntityRecord>, StoreError>;

    /// Range read over a partition, ordered by row key.
    async fn query_by_partition(
        &self,
        table: Table,
        partition: &str,
    ) -> Result<Vec<EntityRecord>, StoreError>;

    /// Remove every record in a partition; returns how many were removed.
    async fn delete_partition(&self, table: Table, partition: &str) -> Result<u64, StoreError>;

    /// Apply operations atomically within one partition. Mixed partitions
    /// are rejected with `Fatal` before anything is written.
    async fn batch(
        &self,
        table: Table,
        operations: Vec<TableOperation>,
    ) -> Result<Vec<ETag>, StoreError>;
}

/// Reject batches that would span partitions.
pub fn ensure_single_partition(operations: &[TableOperation]) -> Result<(), StoreError> {
    let mut partitions = operations.iter().map(|op| op.key().partition.as_str());
    if let Some(first) = partitions.next() {
        if partitions.any(|other| other != first) {
            return Err(StoreError::fatal("batch operations span more than one partition"));
        }
    }
    Ok(())
}
