//! Port describing outbound message queues (email, SMS, events).
//!
//! The core only produces messages; delivery belongs to whatever consumes
//! the queues.
use async_trait::async_trait;
use serde_json::Value;

use super::define_port_error;

define_port_error! {
    /// Errors surfaced by queue adapters.
    pub enum QueueError {
        /// Queue infrastructure is unavailable.
        Unavailable { message: String } => "queue is unavailable: {message}",
        /// The message could not be accepted.
        Rejected { message: String } => "queue message was rejected: {message}",
    }
}

/// Outbound channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    /// Rendered emails for SMTP delivery.
    OutboundEmail,
    /// Text messages.
    OutboundSms,
    /// Mailing-list subscriptions.
    OutboundMailing,
    /// Domain events `{event, payload}`.
    Event,
}

impl QueueName {
    /// Queue name in storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OutboundEmail => "outbound-email",
            Self::OutboundSms => "outbound-sms",
            Self::OutboundMailing => "outbound-mailing",
            Self::Event => "event",
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    /// Append one JSON message to `queue`.
    async fn enqueue(&self, queue: QueueName, message: Value) -> Result<(), QueueError>;
}
