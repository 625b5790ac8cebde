//! Timeout and retry decorator for any [`TableStore`].
//!
//! Every call is bounded by a fixed timeout. Transient failures (including
//! timeouts) are retried with doubling backoff until the attempt budget is
//! spent; logical failures such as `Duplicate` or `PreconditionFailed` are
//! returned at once.
//!
//! An insert whose acknowledgement is lost still commits, so its retry meets
//! its own row. A `Duplicate` that follows a transient attempt is settled by
//! reading the key back: a stored row carrying exactly the inserted
//! properties is reported as the insert's success.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::ports::{
    ETag, EntityKey, EntityRecord, StoreError, Table, TableOperation, TableStore,
};

/// Bounds for one logical store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Ceiling for each attempt.
    pub timeout: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each later one.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

/// Waits between attempts.
#[async_trait]
pub trait StoreSleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the Tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl StoreSleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// [`TableStore`] decorator applying a [`RetryPolicy`].
pub struct RetryingTableStore {
    inner: Arc<dyn TableStore>,
    policy: RetryPolicy,
    sleeper: Arc<dyn StoreSleeper>,
}

impl RetryingTableStore {
    pub fn new(inner: Arc<dyn TableStore>, policy: RetryPolicy) -> Self {
        Self::with_sleeper(inner, policy, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        inner: Arc<dyn TableStore>,
        policy: RetryPolicy,
        sleeper: Arc<dyn StoreSleeper>,
    ) -> Self {
        Self {
            inner,
            policy,
            sleeper,
        }
    }

    async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, StoreError>> + Send,
        T: Send,
    {
        let attempts = self.policy.max_attempts.max(1);
        let mut backoff = self.policy.initial_backoff;
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.policy.timeout, call()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(StoreError::transient(format!(
                    "{operation} timed out after {:?}",
                    self.policy.timeout
                ))),
            };
            match outcome {
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!(operation, attempt, error = %err, "retrying table store call");
                    self.sleeper.sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Decide whether a retried insert's `Duplicate` names the row an
    /// earlier, unacknowledged attempt wrote.
    async fn settle_duplicate_insert(
        &self,
        table: Table,
        record: &EntityRecord,
        duplicate: StoreError,
    ) -> Result<ETag, StoreError> {
        let stored = self
            .run("query_by_key", || self.inner.query_by_key(table, &record.key))
            .await?;
        match stored {
            Some(EntityRecord {
                properties,
                etag: Some(etag),
                ..
            }) if properties == record.properties => {
                info!(
                    partition = %record.key.partition,
                    row = %record.key.row,
                    "retried insert found its own earlier write"
                );
                Ok(etag)
            }
            _ => Err(duplicate),
        }
    }
}

#[async_trait]
impl TableStore for RetryingTableStore {
    async fn insert(&self, table: Table, record: EntityRecord) -> Result<ETag, StoreError> {
        let attempts = AtomicU32::new(0);
        let outcome = self
            .run("insert", || {
                attempts.fetch_add(1, Ordering::Relaxed);
                self.inner.insert(table, record.clone())
            })
            .await;
        match outcome {
            // Only transient failures are retried, so a later attempt means
            // an earlier one may have committed.
            Err(duplicate) if duplicate.is_duplicate() && attempts.load(Ordering::Relaxed) > 1 => {
                self.settle_duplicate_insert(table, &record, duplicate)
                    .await
            }
            other => other,
        }
    }

    async fn replace(&self, table: Table, record: EntityRecord) -> Result<ETag, StoreError> {
        self.run("replace", || self.inner.replace(table, record.clone()))
            .await
    }

    async fn merge(
        &self,
        table: Table,
        record: EntityRecord,
        etag: ETag,
    ) -> Result<ETag, StoreError> {
        self.run("merge", || {
            self.inner.merge(table, record.clone(), etag.clone())
        })
        .await
    }

    async fn query_by_key(
        &self,
        table: Table,
        key: &EntityKey,
    ) -> Result<Option<EntityRecord>, StoreError> {
        self.run("query_by_key", || self.inner.query_by_key(table, key))
            .await
    }

    async fn query_by_partition(
        &self,
        table: Table,
        partition: &str,
    ) -> Result<Vec<EntityRecord>, StoreError> {
        self.run("query_by_partition", || {
            self.inner.query_by_partition(table, partition)
        })
        .await
    }

    async fn delete_partition(&self, table: Table, partition: &str) -> Result<u64, StoreError> {
        self.run("delete_partition", || {
            self.inner.delete_partition(table, partition)
        })
        .await
    }

    async fn batch(
        &self,
        table: Table,
        operations: Vec<TableOperation>,
    ) -> Result<Vec<ETag>, StoreError> {
        self.run("batch", || self.inner.batch(table, operations.clone()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MockTableStore;
    use crate::outbound::persistence::MemoryTableStore;
    use crate::test_support::{FaultyTableStore, RecordingSleeper, StoreCall};
    use rstest::rstest;
    use serde_json::{Map, Value, json};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }

    fn key() -> EntityKey {
        EntityKey::new("p", "r")
    }

    #[rstest]
    #[tokio::test]
    async fn transient_failures_are_retried_with_doubling_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let mut inner = MockTableStore::new();
        inner.expect_query_by_key().times(3).returning(move |_, _| {
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StoreError::transient("busy"))
            } else {
                Ok(None)
            }
        });
        let sleeper = Arc::new(RecordingSleeper::default());
        let store = RetryingTableStore::with_sleeper(Arc::new(inner), policy(), sleeper.clone());

        let found = store.query_by_key(Table::User, &key()).await;

        assert_eq!(found, Ok(None));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_millis(200), Duration::from_millis(400)]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn the_attempt_budget_bounds_retries() {
        let mut inner = MockTableStore::new();
        inner
            .expect_delete_partition()
            .times(3)
            .returning(|_, _| Err(StoreError::transient("down")));
        let sleeper = Arc::new(RecordingSleeper::default());
        let store = RetryingTableStore::with_sleeper(Arc::new(inner), policy(), sleeper.clone());

        let err = store
            .delete_partition(Table::Email, "p")
            .await
            .expect_err("exhausted");

        assert!(err.is_transient());
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[rstest]
    #[case(StoreError::duplicate("p/r"))]
    #[case(StoreError::precondition_failed("p/r"))]
    #[case(StoreError::not_found("p/r"))]
    #[tokio::test]
    async fn logical_failures_are_never_retried(#[case] failure: StoreError) {
        let mut inner = MockTableStore::new();
        let returned = failure.clone();
        inner
            .expect_insert()
            .times(1)
            .returning(move |_, _| Err(returned.clone()));
        let sleeper = Arc::new(RecordingSleeper::default());
        let store = RetryingTableStore::with_sleeper(Arc::new(inner), policy(), sleeper.clone());

        let err = store
            .insert(Table::Email, EntityRecord::new(key(), Map::new()))
            .await
            .expect_err("refused");

        assert_eq!(err, failure);
        assert!(sleeper.delays().is_empty());
    }

    fn record(properties: Value) -> EntityRecord {
        let Value::Object(map) = properties else {
            panic!("properties must be an object");
        };
        EntityRecord::new(key(), map)
    }

    #[rstest]
    #[tokio::test]
    async fn an_insert_that_committed_before_its_ack_was_lost_succeeds() {
        let memory = Arc::new(MemoryTableStore::new());
        let faulty = Arc::new(FaultyTableStore::new(memory.clone()));
        faulty.lose_ack_of_next(
            StoreCall::Insert,
            Table::User,
            StoreError::transient("connection reset"),
        );
        let store = RetryingTableStore::with_sleeper(
            faulty.clone(),
            policy(),
            Arc::new(RecordingSleeper::default()),
        );

        let etag = store
            .insert(Table::User, record(json!({"email": "jane@example.com"})))
            .await
            .expect("own write recognised");

        let stored = memory
            .query_by_key(Table::User, &key())
            .await
            .expect("read")
            .expect("row committed once");
        assert_eq!(stored.etag, Some(etag));
        let inserts = faulty
            .calls()
            .into_iter()
            .filter(|(call, _, _)| *call == StoreCall::Insert)
            .count();
        assert_eq!(inserts, 2);
    }

    #[rstest]
    #[tokio::test]
    async fn a_retried_insert_meeting_someone_elses_row_stays_duplicate() {
        let memory = Arc::new(MemoryTableStore::new());
        memory
            .insert(Table::Email, record(json!({"owner": "someone-else"})))
            .await
            .expect("seeded");
        let faulty = Arc::new(FaultyTableStore::new(memory));
        faulty.fail_next(
            StoreCall::Insert,
            Table::Email,
            StoreError::transient("busy"),
        );
        let store = RetryingTableStore::with_sleeper(
            faulty,
            policy(),
            Arc::new(RecordingSleeper::default()),
        );

        let err = store
            .insert(Table::Email, record(json!({"owner": "me"})))
            .await
            .expect_err("row belongs to another writer");

        assert!(err.is_duplicate());
    }

    #[rstest]
    #[tokio::test]
    async fn a_first_attempt_duplicate_is_not_read_back() {
        let mut inner = MockTableStore::new();
        inner
            .expect_insert()
            .times(1)
            .returning(|_, _| Err(StoreError::duplicate("p/r")));
        inner.expect_query_by_key().never();
        let store = RetryingTableStore::with_sleeper(
            Arc::new(inner),
            policy(),
            Arc::new(RecordingSleeper::default()),
        );

        let err = store
            .insert(Table::Email, EntityRecord::new(key(), Map::new()))
            .await
            .expect_err("duplicate");

        assert_eq!(err, StoreError::duplicate("p/r"));
    }

    /// Store whose point reads never complete.
    struct StalledStore;

    #[async_trait]
    impl TableStore for StalledStore {
        async fn insert(&self, _: Table, _: EntityRecord) -> Result<ETag, StoreError> {
            Err(StoreError::fatal("unused"))
        }

        async fn replace(&self, _: Table, _: EntityRecord) -> Result<ETag, StoreError> {
            Err(StoreError::fatal("unused"))
        }

        async fn merge(&self, _: Table, _: EntityRecord, _: ETag) -> Result<ETag, StoreError> {
            Err(StoreError::fatal("unused"))
        }

        async fn query_by_key(
            &self,
            _: Table,
            _: &EntityKey,
        ) -> Result<Option<EntityRecord>, StoreError> {
            std::future::pending().await
        }

        async fn query_by_partition(
            &self,
            _: Table,
            _: &str,
        ) -> Result<Vec<EntityRecord>, StoreError> {
            Err(StoreError::fatal("unused"))
        }

        async fn delete_partition(&self, _: Table, _: &str) -> Result<u64, StoreError> {
            Err(StoreError::fatal("unused"))
        }

        async fn batch(
            &self,
            _: Table,
            _: Vec<TableOperation>,
        ) -> Result<Vec<ETag>, StoreError> {
            Err(StoreError::fatal("unused"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_calls_time_out_as_transient() {
        let store = RetryingTableStore::new(
            Arc::new(StalledStore),
            RetryPolicy {
                timeout: Duration::from_secs(30),
                max_attempts: 2,
                initial_backoff: Duration::from_millis(200),
            },
        );
        let started = tokio::time::Instant::now();

        let err = store
            .query_by_key(Table::User, &key())
            .await
            .expect_err("timed out");

        assert!(err.is_transient());
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() >= Duration::from_millis(60_200));
    }
}
