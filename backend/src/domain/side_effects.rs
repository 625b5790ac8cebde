//! Detached side effects.
//!
//! Audit appends, notifications, strike persistence, and saga cleanup run
//! without holding up the caller. [`SideEffects::detach`] returns nothing:
//! a detached task's error is logged with its operation name and dropped.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::{debug, warn};

use crate::domain::{Error, TraceId};

/// Future run by [`SideEffects::detach`].
pub type DetachedTask = BoxFuture<'static, Result<(), Error>>;

/// Executor for fire-and-forget work.
pub trait SideEffects: Send + Sync {
    /// Start `task` without awaiting it.
    fn detach(&self, operation: &'static str, task: DetachedTask);
}

/// Shared handle used by domain services.
pub type SharedSideEffects = Arc<dyn SideEffects>;

pub(crate) async fn run_logged(operation: &'static str, task: DetachedTask) {
    match task.await {
        Ok(()) => debug!(operation, "detached side effect completed"),
        Err(error) => warn!(operation, %error, "detached side effect failed"),
    }
}

/// Spawns each task on the Tokio runtime under the caller's trace id.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSideEffects;

impl SideEffects for TokioSideEffects {
    fn detach(&self, operation: &'static str, task: DetachedTask) {
        let trace_id = TraceId::current();
        tokio::spawn(async move {
            match trace_id {
                Some(trace_id) => TraceId::scope(trace_id, run_logged(operation, task)).await,
                None => run_logged(operation, task).await,
            }
        });
    }
}
