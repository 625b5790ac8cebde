//! In-process notification queue.
//!
//! Holds every enqueued message in memory so development servers and tests
//! can inspect what would have been delivered. Messages are never consumed;
//! a deployment with a real consumer uses the PostgreSQL queue instead.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::domain::ports::{NotificationQueue, QueueError, QueueName};

/// Queue adapter that records messages per channel.
#[derive(Debug, Default)]
pub struct MemoryNotificationQueue {
    messages: Mutex<HashMap<QueueName, Vec<Value>>>,
}

impl MemoryNotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages enqueued on `queue`, oldest first.
    pub fn messages(&self, queue: QueueName) -> Vec<Value> {
        self.messages
            .lock()
            .map(|messages| messages.get(&queue).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationQueue for MemoryNotificationQueue {
    async fn enqueue(&self, queue: QueueName, message: Value) -> Result<(), QueueError> {
        let mut messages = self
            .messages
            .lock()
            .map_err(|_| QueueError::unavailable("memory queue lock poisoned"))?;
        messages.entry(queue).or_default().push(message);
        debug!(queue = queue.as_str(), "message enqueued in memory");
        Ok(())
    }
}
