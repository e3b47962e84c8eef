//! Worker slots that reserve tasks, run handlers and settle outcomes.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::observability::task_span;

use super::{
    EnqueueOptions, LeasedTask, QueueResult, RetryPolicies, RetryPolicy, RetryReason,
    StepOutcome, TaskDisposition, TaskEnvelope, TaskQueue, TaskReport,
};

/// Executes one step of a reserved task.
///
/// Handlers never settle tasks themselves; they report a [`StepOutcome`] and
/// the dispatcher acks, reschedules or fails the task accordingly.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Runs the step described by `envelope`.
    async fn handle(&self, envelope: &TaskEnvelope) -> StepOutcome;
}

/// Pulls tasks from a queue and settles handler outcomes.
#[derive(Debug)]
pub struct Dispatcher<Q, H> {
    queue: Arc<Q>,
    handler: Arc<H>,
    policies: RetryPolicies,
    idle_interval: Duration,
}

impl<Q, H> Clone for Dispatcher<Q, H> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            handler: Arc::clone(&self.handler),
            policies: self.policies,
            idle_interval: self.idle_interval,
        }
    }
}

impl<Q, H> Dispatcher<Q, H>
where
    Q: TaskQueue + 'static,
    H: TaskHandler,
{
    /// Creates a dispatcher.
    #[must_use]
    pub const fn new(
        queue: Arc<Q>,
        handler: Arc<H>,
        policies: RetryPolicies,
        idle_interval: Duration,
    ) -> Self {
        Self {
            queue,
            handler,
            policies,
            idle_interval,
        }
    }

    /// Reserves and executes a single task.
    ///
    /// Returns `Ok(None)` when no task is visible.
    ///
    /// # Errors
    ///
    /// Returns [`super::QueueError`] when the queue cannot be read or the task
    /// cannot be settled, including when the lease was lost mid-step.
    pub async fn run_once(&self) -> QueueResult<Option<TaskReport>> {
        let Some(lease) = self.queue.reserve().await? else {
            return Ok(None);
        };
        let envelope = lease.envelope.clone();
        let kind = envelope.kind();
        let policy = self.policies.for_kind(kind);
        if !policy.allows_attempt(envelope.attempt) {
            let message = format!(
                "abandoned after {} attempts without settling",
                policy.max_attempts
            );
            self.queue.fail(&lease, &message).await?;
            error!(
                task_id = %envelope.id,
                kind = %kind,
                pr_id = %envelope.task.pr_id(),
                attempt = envelope.attempt,
                "task exceeded its attempt budget through expired leases"
            );
            return Ok(Some(TaskReport {
                task_id: envelope.id,
                kind,
                attempt: envelope.attempt,
                disposition: TaskDisposition::Failed(message),
            }));
        }
        let span = task_span(&envelope);
        span.in_scope(|| debug!("running task"));

        let handler = Arc::clone(&self.handler);
        let step_envelope = envelope.clone();
        let step = async move { handler.handle(&step_envelope).await };
        let outcome = match tokio::spawn(step.instrument(span)).await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                error!(task_id = %envelope.id, error = %join_error, "task handler aborted");
                StepOutcome::Retryable(RetryReason::Transient(format!(
                    "handler aborted: {join_error}"
                )))
            }
        };

        let disposition = self.settle(&lease, policy, outcome).await?;
        Ok(Some(TaskReport {
            task_id: envelope.id,
            kind,
            attempt: envelope.attempt,
            disposition,
        }))
    }

    /// Runs tasks until none is visible and returns their reports.
    ///
    /// Delayed tasks that are not yet visible are left in the queue.
    ///
    /// # Errors
    ///
    /// Returns the first [`super::QueueError`] raised by [`Self::run_once`].
    pub async fn run_until_idle(&self) -> QueueResult<Vec<TaskReport>> {
        let mut reports = Vec::new();
        while let Some(report) = self.run_once().await? {
            reports.push(report);
        }
        Ok(reports)
    }

    /// Spawns `slots` worker loops that run until `shutdown` is cancelled.
    ///
    /// Each slot settles its current task before reserving the next one and
    /// waits the idle interval whenever the queue has nothing visible.
    #[must_use]
    pub fn spawn_workers(&self, slots: usize, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        (0..slots)
            .map(|slot| {
                let dispatcher = self.clone();
                let token = shutdown.clone();
                tokio::spawn(async move { dispatcher.worker_loop(slot, token).await })
            })
            .collect()
    }

    async fn worker_loop(self, slot: usize, shutdown: CancellationToken) {
        info!(slot, "worker slot started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let idle = match self.run_once().await {
                Ok(Some(report)) => {
                    debug!(slot, task_id = %report.task_id, "task settled");
                    false
                }
                Ok(None) => true,
                Err(err) => {
                    warn!(slot, error = %err, "worker slot iteration failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(self.idle_interval) => {}
                }
            }
        }
        info!(slot, "worker slot stopped");
    }

    async fn settle(
        &self,
        lease: &LeasedTask,
        policy: RetryPolicy,
        outcome: StepOutcome,
    ) -> QueueResult<TaskDisposition> {
        let envelope = &lease.envelope;
        match outcome {
            StepOutcome::Done { result, follow_ups } => {
                for follow_up in follow_ups {
                    if let Err(err) = self.queue.enqueue(follow_up, EnqueueOptions::new()).await {
                        return self
                            .retry_or_fail(lease, policy, RetryReason::Transient(err.to_string()))
                            .await;
                    }
                }
                self.queue.complete(lease).await?;
                info!(
                    task_id = %envelope.id,
                    kind = %envelope.kind(),
                    pr_id = %envelope.task.pr_id(),
                    result = %result,
                    "task completed"
                );
                Ok(TaskDisposition::Completed(result))
            }
            StepOutcome::Retryable(reason) => self.retry_or_fail(lease, policy, reason).await,
            StepOutcome::Fatal(message) => {
                self.queue.fail(lease, &message).await?;
                error!(
                    task_id = %envelope.id,
                    kind = %envelope.kind(),
                    pr_id = %envelope.task.pr_id(),
                    error = %message,
                    "task failed"
                );
                Ok(TaskDisposition::Failed(message))
            }
        }
    }

    async fn retry_or_fail(
        &self,
        lease: &LeasedTask,
        policy: RetryPolicy,
        reason: RetryReason,
    ) -> QueueResult<TaskDisposition> {
        let envelope = &lease.envelope;
        if policy.allows_retry_after(envelope.attempt) {
            self.queue.reschedule(lease, policy.delay).await?;
            debug!(
                task_id = %envelope.id,
                attempt = envelope.attempt,
                delay_secs = policy.delay.as_secs(),
                reason = %reason,
                "task rescheduled"
            );
            return Ok(TaskDisposition::Rescheduled {
                delay: policy.delay,
                reason,
            });
        }

        match reason {
            RetryReason::NotConverged(health) => {
                let message = format!(
                    "timed out after {} attempts, last health {health}",
                    envelope.attempt
                );
                self.queue.fail(lease, &message).await?;
                warn!(
                    task_id = %envelope.id,
                    pr_id = %envelope.task.pr_id(),
                    attempts = envelope.attempt,
                    health = %health,
                    "deployment did not converge"
                );
                Ok(TaskDisposition::TimedOut)
            }
            RetryReason::Transient(message) => {
                self.queue.fail(lease, &message).await?;
                error!(
                    task_id = %envelope.id,
                    kind = %envelope.kind(),
                    pr_id = %envelope.task.pr_id(),
                    attempts = envelope.attempt,
                    error = %message,
                    "task retries exhausted"
                );
                Ok(TaskDisposition::Failed(message))
            }
        }
    }
}
