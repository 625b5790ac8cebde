//! Test doubles shared by unit tests in `src/` and integration tests in
//! `tests/`.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;

use crate::domain::ports::{
    ETag, EntityKey, EntityRecord, StoreError, Table, TableOperation, TableStore,
};
use crate::domain::side_effects::{DetachedTask, SideEffects};
use crate::domain::Error;
use crate::outbound::persistence::StoreSleeper;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Clock that only moves when told to.
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, delta: TimeDelta) {
        *lock(&self.0) += delta;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.0) = now;
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *lock(&self.0)
    }
}

/// Holds detached tasks until the test runs them.
#[derive(Default)]
pub struct DeferredSideEffects {
    pending: Mutex<Vec<(&'static str, DetachedTask)>>,
}

impl DeferredSideEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operation names queued so far, in order.
    pub fn pending(&self) -> Vec<&'static str> {
        lock(&self.pending).iter().map(|(name, _)| *name).collect()
    }

    /// Drain and await every queued task, including tasks queued while
    /// draining.
    pub async fn run_all(&self) -> Vec<(&'static str, Result<(), Error>)> {
        let mut outcomes = Vec::new();
        loop {
            let batch: Vec<_> = lock(&self.pending).drain(..).collect();
            if batch.is_empty() {
                return outcomes;
            }
            for (name, task) in batch {
                outcomes.push((name, task.await));
            }
        }
    }
}

impl SideEffects for DeferredSideEffects {
    fn detach(&self, operation: &'static str, task: DetachedTask) {
        lock(&self.pending).push((operation, task));
    }
}

/// Store call kinds a [`FaultyTableStore`] can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreCall {
    Insert,
    Replace,
    Merge,
    QueryByKey,
    DeletePartition,
}

struct Fault {
    call: StoreCall,
    table: Table,
    partition: Option<String>,
    error: StoreError,
    after_commit: bool,
}

/// Decorator that fails scripted calls and passes the rest through.
///
/// Each scripted fault fires once, on the first matching call. Faults added
/// with [`fail_next`](Self::fail_next) fire before the inner store sees the
/// call; those added with [`lose_ack_of_next`](Self::lose_ack_of_next) let
/// the write commit and then report the error.
pub struct FaultyTableStore {
    inner: Arc<dyn TableStore>,
    faults: Mutex<Vec<Fault>>,
    calls: Mutex<Vec<(StoreCall, Table, String)>>,
}

impl FaultyTableStore {
    pub fn new(inner: Arc<dyn TableStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `call` against `table`.
    pub fn fail_next(&self, call: StoreCall, table: Table, error: StoreError) {
        lock(&self.faults).push(Fault {
            call,
            table,
            partition: None,
            error,
            after_commit: false,
        });
    }

    /// Let the next `call` against `table` commit, then report `error`.
    pub fn lose_ack_of_next(&self, call: StoreCall, table: Table, error: StoreError) {
        lock(&self.faults).push(Fault {
            call,
            table,
            partition: None,
            error,
            after_commit: true,
        });
    }

    /// Fail the next `call` against `partition` of `table`.
    pub fn fail_next_for(
        &self,
        call: StoreCall,
        table: Table,
        partition: impl Into<String>,
        error: StoreError,
    ) {
        lock(&self.faults).push(Fault {
            call,
            table,
            partition: Some(partition.into()),
            error,
            after_commit: false,
        });
    }

    /// Drop faults that have not fired yet.
    pub fn clear_faults(&self) {
        lock(&self.faults).clear();
    }

    /// Every call seen, in order.
    pub fn calls(&self) -> Vec<(StoreCall, Table, String)> {
        lock(&self.calls).clone()
    }

    fn take_fault(
        &self,
        call: StoreCall,
        table: Table,
        partition: &str,
        after_commit: bool,
    ) -> Option<StoreError> {
        let mut faults = lock(&self.faults);
        let position = faults.iter().position(|fault| {
            fault.call == call
                && fault.table == table
                && fault.after_commit == after_commit
                && fault
                    .partition
                    .as_deref()
                    .is_none_or(|expected| expected == partition)
        });
        position.map(|index| faults.remove(index).error)
    }

    fn check(&self, call: StoreCall, table: Table, partition: &str) -> Result<(), StoreError> {
        lock(&self.calls).push((call, table, partition.to_owned()));
        match self.take_fault(call, table, partition, false) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn acknowledge<T>(
        &self,
        call: StoreCall,
        table: Table,
        partition: &str,
        result: Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let committed = result?;
        match self.take_fault(call, table, partition, true) {
            Some(error) => Err(error),
            None => Ok(committed),
        }
    }
}

#[async_trait]
impl TableStore for FaultyTableStore {
    async fn insert(&self, table: Table, record: EntityRecord) -> Result<ETag, StoreError> {
        let partition = record.key.partition.clone();
        self.check(StoreCall::Insert, table, &partition)?;
        let result = self.inner.insert(table, record).await;
        self.acknowledge(StoreCall::Insert, table, &partition, result)
    }

    async fn replace(&self, table: Table, record: EntityRecord) -> Result<ETag, StoreError> {
        let partition = record.key.partition.clone();
        self.check(StoreCall::Replace, table, &partition)?;
        let result = self.inner.replace(table, record).await;
        self.acknowledge(StoreCall::Replace, table, &partition, result)
    }

    async fn merge(
        &self,
        table: Table,
        record: EntityRecord,
        etag: ETag,
    ) -> Result<ETag, StoreError> {
        let partition = record.key.partition.clone();
        self.check(StoreCall::Merge, table, &partition)?;
        let result = self.inner.merge(table, record, etag).await;
        self.acknowledge(StoreCall::Merge, table, &partition, result)
    }

    async fn query_by_key(
        &self,
        table: Table,
        key: &EntityKey,
    ) -> Result<Option<EntityRecord>, StoreError> {
        self.check(StoreCall::QueryByKey, table, &key.partition)?;
        self.inner.query_by_key(table, key).await
    }

    async fn query_by_partition(
        &self,
        table: Table,
        partition: &str,
    ) -> Result<Vec<EntityRecord>, StoreError> {
        self.inner.query_by_partition(table, partition).await
    }

    async fn delete_partition(&self, table: Table, partition: &str) -> Result<u64, StoreError> {
        self.check(StoreCall::DeletePartition, table, partition)?;
        self.inner.delete_partition(table, partition).await
    }

    async fn batch(
        &self,
        table: Table,
        operations: Vec<TableOperation>,
    ) -> Result<Vec<ETag>, StoreError> {
        self.inner.batch(table, operations).await
    }
}

/// Sleeper that returns at once and records the requested delays.
#[derive(Default)]
pub struct RecordingSleeper(Mutex<Vec<Duration>>);

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        lock(&self.0).clone()
    }
}

#[async_trait]
impl StoreSleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.0).push(duration);
    }
}
