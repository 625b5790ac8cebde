//! In-process table store.
//!
//! Used when no database URL is configured and by the test suites. Every
//! call holds the lock only for the synchronous update, never across an
//! await. Concurrency tokens are a monotonically increasing counter.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::ports::{
    ETag, EntityKey, EntityRecord, StoreError, Table, TableOperation, TableStore,
    ensure_single_partition,
};

#[derive(Debug, Clone)]
struct Stored {
    properties: Map<String, Value>,
    etag: ETag,
}

type Rows = BTreeMap<EntityKey, Stored>;

/// Table store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryTableStore {
    tables: Mutex<HashMap<Table, Rows>>,
    version: AtomicU64,
}

fn describe(key: &EntityKey) -> String {
    format!("{}/{}", key.partition, key.row)
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_etag(&self) -> ETag {
        let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
        ETag::new(format!("W/\"{version}\""))
    }

    fn with_rows<T>(
        &self,
        table: Table,
        apply: impl FnOnce(&mut Rows) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::fatal("memory table store lock poisoned"))?;
        apply(tables.entry(table).or_default())
    }

    fn apply(&self, rows: &mut Rows, operation: TableOperation) -> Result<ETag, StoreError> {
        match operation {
            TableOperation::Insert(record) => {
                if rows.contains_key(&record.key) {
                    return Err(StoreError::duplicate(describe(&record.key)));
                }
                let etag = self.next_etag();
                rows.insert(
                    record.key,
                    Stored {
                        properties: record.properties,
                        etag: etag.clone(),
                    },
                );
                Ok(etag)
            }
            TableOperation::Replace(record) => {
                let Some(stored) = rows.get_mut(&record.key) else {
                    return Err(StoreError::not_found(describe(&record.key)));
                };
                stored.properties = record.properties;
                stored.etag = self.next_etag();
                Ok(stored.etag.clone())
            }
            TableOperation::Merge { record, etag } => {
                let Some(stored) = rows.get_mut(&record.key) else {
                    return Err(StoreError::not_found(describe(&record.key)));
                };
                if !etag.permits(&stored.etag) {
                    return Err(StoreError::precondition_failed(describe(&record.key)));
                }
                stored.properties.extend(record.properties);
                stored.etag = self.next_etag();
                Ok(stored.etag.clone())
            }
            TableOperation::Delete { key, etag } => {
                let Some(stored) = rows.get(&key) else {
                    return Err(StoreError::not_found(describe(&key)));
                };
                if !etag.permits(&stored.etag) {
                    return Err(StoreError::precondition_failed(describe(&key)));
                }
                let removed = stored.etag.clone();
                rows.remove(&key);
                Ok(removed)
            }
        }
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn insert(&self, table: Table, record: EntityRecord) -> Result<ETag, StoreError> {
        self.with_rows(table, |rows| self.apply(rows, TableOperation::Insert(record)))
    }

    async fn replace(&self, table: Table, record: EntityRecord) -> Result<ETag, StoreError> {
        self.with_rows(table, |rows| self.apply(rows, TableOperation::Replace(record)))
    }

    async fn merge(
        &self,
        table: Table,
        record: EntityRecord,
        etag: ETag,
    ) -> Result<ETag, StoreError> {
        self.with_rows(table, |rows| {
            self.apply(rows, TableOperation::Merge { record, etag })
        })
    }

    async fn query_by_key(
        &self,
        table: Table,
        key: &EntityKey,
    ) -> Result<Option<EntityRecord>, StoreError> {
        self.with_rows(table, |rows| {
            Ok(rows.get(key).map(|stored| EntityRecord {
                key: key.clone(),
                properties: stored.properties.clone(),
                etag: Some(stored.etag.clone()),
            }))
        })
    }

    async fn query_by_partition(
        &self,
        table: Table,
        partition: &str,
    ) -> Result<Vec<EntityRecord>, StoreError> {
        self.with_rows(table, |rows| {
            Ok(rows
                .iter()
                .filter(|(key, _)| key.partition == partition)
                .map(|(key, stored)| EntityRecord {
                    key: key.clone(),
                    properties: stored.properties.clone(),
                    etag: Some(stored.etag.clone()),
                })
                .collect())
        })
    }

    async fn delete_partition(&self, table: Table, partition: &str) -> Result<u64, StoreError> {
        self.with_rows(table, |rows| {
            let before = rows.len();
            rows.retain(|key, _| key.partition != partition);
            Ok(u64::try_from(before - rows.len()).unwrap_or(u64::MAX))
        })
    }

    async fn batch(
        &self,
        table: Table,
        operations: Vec<TableOperation>,
    ) -> Result<Vec<ETag>, StoreError> {
        ensure_single_partition(&operations)?;
        self.with_rows(table, |rows| {
            let mut scratch = rows.clone();
            let etags = operations
                .into_iter()
                .map(|operation| self.apply(&mut scratch, operation))
                .collect::<Result<Vec<_>, _>>()?;
            *rows = scratch;
            Ok(etags)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn store() -> MemoryTableStore {
        MemoryTableStore::new()
    }

    fn record(partition: &str, row: &str, properties: Value) -> EntityRecord {
        let Value::Object(map) = properties else {
            panic!("properties must be an object");
        };
        EntityRecord::new(EntityKey::new(partition, row), map)
    }

    #[rstest]
    #[tokio::test]
    async fn insert_rejects_duplicates(store: MemoryTableStore) {
        store
            .insert(Table::Email, record("a", "email", json!({"n": 1})))
            .await
            .expect("first insert");
        let err = store
            .insert(Table::Email, record("a", "email", json!({"n": 2})))
            .await
            .expect_err("duplicate");
        assert!(err.is_duplicate());
    }

    #[rstest]
    #[tokio::test]
    async fn merge_updates_only_supplied_fields(store: MemoryTableStore) {
        let etag = store
            .insert(Table::User, record("u", "user", json!({"a": 1, "b": 2})))
            .await
            .expect("insert");
        let next = store
            .merge(Table::User, record("u", "user", json!({"b": 3})), etag.clone())
            .await
            .expect("merge");
        assert_ne!(next, etag);
        let stored = store
            .query_by_key(Table::User, &EntityKey::new("u", "user"))
            .await
            .expect("read")
            .expect("present");
        assert_eq!(Value::Object(stored.properties), json!({"a": 1, "b": 3}));
        assert_eq!(stored.etag, Some(next));
    }

    #[rstest]
    #[tokio::test]
    async fn stale_tokens_lose(store: MemoryTableStore) {
        let first = store
            .insert(Table::User, record("u", "user", json!({})))
            .await
            .expect("insert");
        store
            .merge(Table::User, record("u", "user", json!({"x": 1})), first.clone())
            .await
            .expect("first writer");
        let err = store
            .merge(Table::User, record("u", "user", json!({"x": 2})), first)
            .await
            .expect_err("second writer");
        assert!(matches!(err, StoreError::PreconditionFailed { .. }));
        store
            .merge(Table::User, record("u", "user", json!({"x": 3})), ETag::any())
            .await
            .expect("wildcard forces");
    }

    #[rstest]
    #[tokio::test]
    async fn writes_to_missing_records_are_not_found(store: MemoryTableStore) {
        let replace = store
            .replace(Table::User, record("u", "user", json!({})))
            .await
            .expect_err("absent");
        let merge = store
            .merge(Table::User, record("u", "user", json!({})), ETag::any())
            .await
            .expect_err("absent");
        assert!(replace.is_not_found());
        assert!(merge.is_not_found());
    }

    #[rstest]
    #[tokio::test]
    async fn delete_partition_removes_every_row(store: MemoryTableStore) {
        for row in ["user", "a", "b"] {
            store
                .insert(Table::User, record("u", row, json!({})))
                .await
                .expect("insert");
        }
        store
            .insert(Table::User, record("other", "user", json!({})))
            .await
            .expect("insert");
        assert_eq!(store.delete_partition(Table::User, "u").await.expect("delete"), 3);
        assert!(
            store
                .query_by_partition(Table::User, "u")
                .await
                .expect("query")
                .is_empty()
        );
        assert_eq!(
            store
                .query_by_partition(Table::User, "other")
                .await
                .expect("query")
                .len(),
            1
        );
    }

    #[rstest]
    #[tokio::test]
    async fn failed_batches_leave_no_trace(store: MemoryTableStore) {
        store
            .insert(Table::User, record("u", "b", json!({})))
            .await
            .expect("insert");
        let err = store
            .batch(
                Table::User,
                vec![
                    TableOperation::Insert(record("u", "a", json!({}))),
                    TableOperation::Insert(record("u", "b", json!({}))),
                ],
            )
            .await
            .expect_err("second insert collides");
        assert!(err.is_duplicate());
        let rows = store
            .query_by_partition(Table::User, "u")
            .await
            .expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key.row, "b");
    }

    #[rstest]
    #[tokio::test]
    async fn cross_partition_batches_are_rejected(store: MemoryTableStore) {
        let err = store
            .batch(
                Table::User,
                vec![
                    TableOperation::Insert(record("u", "a", json!({}))),
                    TableOperation::Insert(record("v", "a", json!({}))),
                ],
            )
            .await
            .expect_err("spans partitions");
        assert!(matches!(err, StoreError::Fatal { .. }));
    }
}
