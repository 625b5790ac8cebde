//! PostgreSQL-backed [`NotificationQueue`].
//!
//! Messages land in `queue_messages`; delivery workers consume them in id
//! order per queue.

use async_trait::async_trait;
use chrono::Utc;
use diesel_async::RunQueryDsl;
use serde_json::Value;
use tracing::debug;

use super::models::NewQueueMessageRow;
use super::pool::DbPool;
use super::schema::queue_messages;
use crate::domain::ports::{NotificationQueue, QueueError, QueueName};

/// Diesel-backed notification queue.
#[derive(Clone)]
pub struct DieselNotificationQueue {
    pool: DbPool,
}

impl DieselNotificationQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationQueue for DieselNotificationQueue {
    async fn enqueue(&self, queue: QueueName, message: Value) -> Result<(), QueueError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| QueueError::unavailable(err.to_string()))?;
        let row = NewQueueMessageRow {
            queue: queue.as_str(),
            payload: message,
            enqueued_at: Utc::now(),
        };
        diesel::insert_into(queue_messages::table)
            .values(&row)
            .execute(&mut conn)
            .await
            .map_err(|err| QueueError::rejected(err.to_string()))?;
        debug!(queue = queue.as_str(), "message enqueued");
        Ok(())
    }
}
