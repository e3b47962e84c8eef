//! Task queue port.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::{LeasedTask, ReconciliationTask, TaskId};

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Options for task enqueueing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Delay before the task becomes visible to workers.
    pub delay: Option<Duration>,
}

impl EnqueueOptions {
    /// Creates default options.
    #[must_use]
    pub const fn new() -> Self {
        Self { delay: None }
    }

    /// Sets the delay before the task becomes visible.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Durable at-least-once task queue with leases.
///
/// A reserved task is hidden until its lease lapses. Settling operations
/// (`complete`, `reschedule`, `fail`) require the current lease.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueues a task and returns its identifier immediately.
    async fn enqueue(
        &self,
        task: ReconciliationTask,
        options: EnqueueOptions,
    ) -> QueueResult<TaskId>;

    /// Reserves the next visible task, if any.
    ///
    /// Redelivering a task whose lease lapsed counts the abandoned execution:
    /// the returned envelope carries the next attempt number.
    async fn reserve(&self) -> QueueResult<Option<LeasedTask>>;

    /// Acknowledges a finished task.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::LeaseLost`] when the lease is no longer current.
    async fn complete(&self, lease: &LeasedTask) -> QueueResult<()>;

    /// Releases the task for another execution after `delay`, incrementing
    /// its attempt number.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::LeaseLost`] when the lease is no longer current.
    async fn reschedule(&self, lease: &LeasedTask, delay: Duration) -> QueueResult<()>;

    /// Marks the task permanently failed.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::LeaseLost`] when the lease is no longer current.
    async fn fail(&self, lease: &LeasedTask, reason: &str) -> QueueResult<()>;

    /// Returns the number of tasks awaiting execution, reserved or not.
    async fn depth(&self) -> QueueResult<usize>;
}

/// Errors returned by task queues.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// The lease expired or the task was settled by another worker.
    #[error("lease lost for task {0}")]
    LeaseLost(TaskId),

    /// A persisted task payload could not be encoded or decoded.
    #[error("task payload error: {0}")]
    Payload(String),

    /// Backend failure.
    #[error("queue backend error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl QueueError {
    /// Wraps a backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}
