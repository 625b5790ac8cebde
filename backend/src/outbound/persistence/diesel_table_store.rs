//! PostgreSQL-backed [`TableStore`].
//!
//! Every logical table lives in the single `entities` table keyed by
//! `(table_name, partition_key, row_key)`. Conditional writes filter on the
//! stored `etag` and disambiguate zero-row updates with a follow-up read.
//! Batches run inside one transaction.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::models::{EntityRow, NewEntityRow};
use super::pool::{DbPool, PoolError};
use super::schema::entities;
use crate::domain::ports::{
    ETag, EntityKey, EntityRecord, StoreError, Table, TableOperation, TableStore,
    ensure_single_partition,
};

fn describe(key: &EntityKey) -> String {
    format!("{}/{}", key.partition, key.row)
}

fn map_pool_error(error: PoolError) -> StoreError {
    StoreError::transient(error.to_string())
}

/// Map Diesel failures onto store errors. Unique violations become
/// `Duplicate`; lost connections are transient.
fn map_diesel_error(error: DieselError) -> StoreError {
    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(error = %error, "diesel operation failed"),
    }
    match error {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            StoreError::duplicate(info.message().to_owned())
        }
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _)
        | DieselError::BrokenTransactionManager => {
            StoreError::transient("database connection error")
        }
        DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => {
            StoreError::transient("serialization failure")
        }
        other => StoreError::fatal(other.to_string()),
    }
}

/// Parse a token produced by this store. Foreign tokens can never match.
fn parse_etag(etag: &ETag, key: &EntityKey) -> Result<Uuid, StoreError> {
    Uuid::parse_str(etag.as_str()).map_err(|_| StoreError::precondition_failed(describe(key)))
}

fn etag_of(token: Uuid) -> ETag {
    ETag::new(token.to_string())
}

/// Error type for batch transactions, so either kind rolls back.
#[derive(Debug)]
enum TxError {
    Store(StoreError),
    Diesel(DieselError),
}

impl From<DieselError> for TxError {
    fn from(value: DieselError) -> Self {
        Self::Diesel(value)
    }
}

impl From<TxError> for StoreError {
    fn from(value: TxError) -> Self {
        match value {
            TxError::Store(err) => err,
            TxError::Diesel(err) => map_diesel_error(err),
        }
    }
}

async fn exists(
    conn: &mut AsyncPgConnection,
    table: Table,
    key: &EntityKey,
) -> Result<bool, StoreError> {
    let found = entities::table
        .filter(entities::table_name.eq(table.as_str()))
        .filter(entities::partition_key.eq(&key.partition))
        .filter(entities::row_key.eq(&key.row))
        .select(entities::etag)
        .first::<Uuid>(conn)
        .await
        .optional()
        .map_err(map_diesel_error)?;
    Ok(found.is_some())
}

/// Explain a conditional write that touched no rows.
async fn zero_rows(conn: &mut AsyncPgConnection, table: Table, key: &EntityKey) -> StoreError {
    match exists(conn, table, key).await {
        Ok(true) => StoreError::precondition_failed(describe(key)),
        Ok(false) => StoreError::not_found(describe(key)),
        Err(err) => err,
    }
}

async fn insert_row(
    conn: &mut AsyncPgConnection,
    table: Table,
    record: EntityRecord,
) -> Result<ETag, StoreError> {
    let token = Uuid::new_v4();
    let row = NewEntityRow {
        table_name: table.as_str(),
        partition_key: &record.key.partition,
        row_key: &record.key.row,
        properties: Value::Object(record.properties),
        etag: token,
        updated_at: Utc::now(),
    };
    diesel::insert_into(entities::table)
        .values(&row)
        .execute(conn)
        .await
        .map_err(map_diesel_error)?;
    Ok(etag_of(token))
}

async fn replace_row(
    conn: &mut AsyncPgConnection,
    table: Table,
    record: EntityRecord,
) -> Result<ETag, StoreError> {
    let token = Uuid::new_v4();
    let updated = diesel::update(
        entities::table
            .filter(entities::table_name.eq(table.as_str()))
            .filter(entities::partition_key.eq(&record.key.partition))
            .filter(entities::row_key.eq(&record.key.row)),
    )
    .set((
        entities::properties.eq(Value::Object(record.properties)),
        entities::etag.eq(token),
        entities::updated_at.eq(Utc::now()),
    ))
    .execute(conn)
    .await
    .map_err(map_diesel_error)?;
    if updated == 0 {
        return Err(StoreError::not_found(describe(&record.key)));
    }
    Ok(etag_of(token))
}

async fn merge_row(
    conn: &mut AsyncPgConnection,
    table: Table,
    record: EntityRecord,
    etag: &ETag,
) -> Result<ETag, StoreError> {
    let token = Uuid::new_v4();
    let target = entities::table
        .filter(entities::table_name.eq(table.as_str()))
        .filter(entities::partition_key.eq(&record.key.partition))
        .filter(entities::row_key.eq(&record.key.row));
    let changes = (
        entities::properties.eq(entities::properties.concat(Value::Object(record.properties))),
        entities::etag.eq(token),
        entities::updated_at.eq(Utc::now()),
    );
    let updated = if etag.is_any() {
        diesel::update(target).set(changes).execute(conn).await
    } else {
        let expected = parse_etag(etag, &record.key)?;
        diesel::update(target.filter(entities::etag.eq(expected)))
            .set(changes)
            .execute(conn)
            .await
    }
    .map_err(map_diesel_error)?;
    if updated == 0 {
        return Err(zero_rows(conn, table, &record.key).await);
    }
    Ok(etag_of(token))
}

async fn delete_row(
    conn: &mut AsyncPgConnection,
    table: Table,
    key: &EntityKey,
    etag: &ETag,
) -> Result<ETag, StoreError> {
    let target = entities::table
        .filter(entities::table_name.eq(table.as_str()))
        .filter(entities::partition_key.eq(&key.partition))
        .filter(entities::row_key.eq(&key.row));
    let removed = if etag.is_any() {
        diesel::delete(target)
            .returning(entities::etag)
            .get_result::<Uuid>(conn)
            .await
            .optional()
    } else {
        let expected = parse_etag(etag, key)?;
        diesel::delete(target.filter(entities::etag.eq(expected)))
            .returning(entities::etag)
            .get_result::<Uuid>(conn)
            .await
            .optional()
    }
    .map_err(map_diesel_error)?;
    match removed {
        Some(token) => Ok(etag_of(token)),
        None => Err(zero_rows(conn, table, key).await),
    }
}

async fn apply(
    conn: &mut AsyncPgConnection,
    table: Table,
    operation: TableOperation,
) -> Result<ETag, StoreError> {
    match operation {
        TableOperation::Insert(record) => insert_row(conn, table, record).await,
        TableOperation::Replace(record) => replace_row(conn, table, record).await,
        TableOperation::Merge { record, etag } => merge_row(conn, table, record, &etag).await,
        TableOperation::Delete { key, etag } => delete_row(conn, table, &key, &etag).await,
    }
}

/// Diesel-backed table store.
#[derive(Clone)]
pub struct DieselTableStore {
    pool: DbPool,
}

impl DieselTableStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TableStore for DieselTableStore {
    async fn insert(&self, table: Table, record: EntityRecord) -> Result<ETag, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        insert_row(&mut conn, table, record).await
    }

    async fn replace(&self, table: Table, record: EntityRecord) -> Result<ETag, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        replace_row(&mut conn, table, record).await
    }

    async fn merge(
        &self,
        table: Table,
        record: EntityRecord,
        etag: ETag,
    ) -> Result<ETag, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        merge_row(&mut conn, table, record, &etag).await
    }

    async fn query_by_key(
        &self,
        table: Table,
        key: &EntityKey,
    ) -> Result<Option<EntityRecord>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<EntityRow> = entities::table
            .filter(entities::table_name.eq(table.as_str()))
            .filter(entities::partition_key.eq(&key.partition))
            .filter(entities::row_key.eq(&key.row))
            .select(EntityRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(EntityRow::into_record).transpose()
    }

    async fn query_by_partition(
        &self,
        table: Table,
        partition: &str,
    ) -> Result<Vec<EntityRecord>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<EntityRow> = entities::table
            .filter(entities::table_name.eq(table.as_str()))
            .filter(entities::partition_key.eq(partition))
            .select(EntityRow::as_select())
            .order_by(entities::row_key)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(EntityRow::into_record).collect()
    }

    async fn delete_partition(&self, table: Table, partition: &str) -> Result<u64, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let removed = diesel::delete(
            entities::table
                .filter(entities::table_name.eq(table.as_str()))
                .filter(entities::partition_key.eq(partition)),
        )
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }

    async fn batch(
        &self,
        table: Table,
        operations: Vec<TableOperation>,
    ) -> Result<Vec<ETag>, StoreError> {
        ensure_single_partition(&operations)?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let etags = conn
            .transaction::<_, TxError, _>(|conn| {
                async move {
                    let mut etags = Vec::with_capacity(operations.len());
                    for operation in operations {
                        etags.push(apply(conn, table, operation).await.map_err(TxError::Store)?);
                    }
                    Ok(etags)
                }
                .scope_boxed()
            })
            .await?;
        Ok(etags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn pool_failures_are_transient() {
        let err = map_pool_error(PoolError::checkout("timed out"));
        assert!(err.is_transient());
    }

    #[rstest]
    fn missing_rows_are_fatal_when_unexpected() {
        let err = map_diesel_error(DieselError::NotFound);
        assert!(matches!(err, StoreError::Fatal { .. }));
    }

    #[rstest]
    fn foreign_tokens_never_match() {
        let key = EntityKey::new("p", "r");
        let err = parse_etag(&ETag::new("W/\"7\""), &key).expect_err("not a uuid");
        assert!(matches!(err, StoreError::PreconditionFailed { .. }));
        let token = Uuid::new_v4();
        assert_eq!(parse_etag(&etag_of(token), &key), Ok(token));
    }

    #[rstest]
    fn transaction_errors_keep_their_store_meaning() {
        let err = StoreError::from(TxError::Store(StoreError::not_found("p/r")));
        assert_eq!(err, StoreError::not_found("p/r"));
        let err = StoreError::from(TxError::Diesel(DieselError::BrokenTransactionManager));
        assert!(err.is_transient());
    }
}
