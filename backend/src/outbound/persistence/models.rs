//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use super::schema::{entities, queue_messages};
use crate::domain::ports::{ETag, EntityKey, EntityRecord, StoreError};

/// Row struct for reading from the entities table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = entities)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct EntityRow {
    pub partition_key: String,
    pub row_key: String,
    pub properties: Value,
    pub etag: Uuid,
}

impl EntityRow {
    /// Convert to the port record; the property bag must be an object.
    pub fn into_record(self) -> Result<EntityRecord, StoreError> {
        let Value::Object(properties) = self.properties else {
            return Err(StoreError::fatal(format!(
                "properties of {}/{} are not an object",
                self.partition_key, self.row_key
            )));
        };
        Ok(EntityRecord {
            key: EntityKey::new(self.partition_key, self.row_key),
            properties,
            etag: Some(ETag::new(self.etag.to_string())),
        })
    }
}

/// Insertable struct for new entities.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = entities)]
pub(crate) struct NewEntityRow<'a> {
    pub table_name: &'a str,
    pub partition_key: &'a str,
    pub row_key: &'a str,
    pub properties: Value,
    pub etag: Uuid,
    pub updated_at: DateTime<Utc>,
}

/// Insertable struct for queued notifications.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = queue_messages)]
pub(crate) struct NewQueueMessageRow<'a> {
    pub queue: &'a str,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
}
