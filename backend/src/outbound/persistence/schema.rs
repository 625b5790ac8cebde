//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `backend/migrations` exactly. Regenerate
//! with `diesel print-schema` after changing a migration.

diesel::table! {
    /// Key-partitioned entities for every logical table.
    ///
    /// `table_name` separates the logical tables (`email`, `user`,
    /// `system`); `etag` changes on every write.
    entities (table_name, partition_key, row_key) {
        table_name -> Varchar,
        partition_key -> Varchar,
        row_key -> Varchar,
        /// Uninterpreted property bag (always a JSON object).
        properties -> Jsonb,
        /// Concurrency token.
        etag -> Uuid,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Outbound notification messages awaiting a consumer.
    queue_messages (id) {
        id -> Int8,
        queue -> Varchar,
        payload -> Jsonb,
        enqueued_at -> Timestamptz,
    }
}
