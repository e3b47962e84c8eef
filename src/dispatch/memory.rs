//! In-memory task queue driven by an injected clock.
//!
//! Delays and leases are evaluated against the clock on every call, so tests
//! can step time forward instead of sleeping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{
    EnqueueOptions, LeaseId, LeasedTask, QueueError, QueueResult, ReconciliationTask, TaskEnvelope,
    TaskId, TaskQueue,
};

#[derive(Debug, Clone)]
struct QueueEntry {
    seq: u64,
    envelope: TaskEnvelope,
    lease: Option<(LeaseId, DateTime<Utc>)>,
}

impl QueueEntry {
    fn visible_at(&self) -> DateTime<Utc> {
        self.lease
            .map_or(self.envelope.available_at, |(_, until)| until)
    }
}

/// A permanently failed task kept for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTask {
    /// Task as last executed.
    pub envelope: TaskEnvelope,
    /// Failure reason.
    pub reason: String,
}

#[derive(Debug, Default)]
struct QueueState {
    next_seq: u64,
    pending: Vec<QueueEntry>,
    completed: Vec<TaskEnvelope>,
    failed: Vec<FailedTask>,
}

/// In-memory task queue.
#[derive(Debug, Clone)]
pub struct InMemoryTaskQueue<C> {
    state: Arc<Mutex<QueueState>>,
    clock: Arc<C>,
    lease_timeout: Duration,
}

fn poisoned<T>(err: std::sync::PoisonError<T>) -> QueueError {
    QueueError::backend(std::io::Error::other(err.to_string()))
}

fn offset(at: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl<C: Clock> InMemoryTaskQueue<C> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new(clock: Arc<C>, lease_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            clock,
            lease_timeout,
        }
    }

    fn lock(&self) -> QueueResult<MutexGuard<'_, QueueState>> {
        self.state.lock().map_err(poisoned)
    }

    /// Returns the earliest time a pending task becomes visible.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Backend`] when the state lock is poisoned.
    pub fn next_visible_at(&self) -> QueueResult<Option<DateTime<Utc>>> {
        let state = self.lock()?;
        Ok(state.pending.iter().map(QueueEntry::visible_at).min())
    }

    /// Returns tasks acked so far, in completion order.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Backend`] when the state lock is poisoned.
    pub fn completed(&self) -> QueueResult<Vec<TaskEnvelope>> {
        Ok(self.lock()?.completed.clone())
    }

    /// Returns permanently failed tasks.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Backend`] when the state lock is poisoned.
    pub fn failed(&self) -> QueueResult<Vec<FailedTask>> {
        Ok(self.lock()?.failed.clone())
    }

    /// Returns pending tasks, reserved or not, in enqueue order.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Backend`] when the state lock is poisoned.
    pub fn pending(&self) -> QueueResult<Vec<TaskEnvelope>> {
        let state = self.lock()?;
        Ok(state.pending.iter().map(|entry| entry.envelope.clone()).collect())
    }

    fn take_leased(state: &mut QueueState, lease: &LeasedTask) -> QueueResult<QueueEntry> {
        let position = state
            .pending
            .iter()
            .position(|entry| {
                entry.envelope.id == lease.envelope.id
                    && entry.lease.is_some_and(|(id, _)| id == lease.lease_id)
            })
            .ok_or(QueueError::LeaseLost(lease.envelope.id))?;
        Ok(state.pending.remove(position))
    }
}

#[async_trait]
impl<C: Clock + Send + Sync + 'static> TaskQueue for InMemoryTaskQueue<C> {
    async fn enqueue(
        &self,
        task: ReconciliationTask,
        options: EnqueueOptions,
    ) -> QueueResult<TaskId> {
        let now = self.clock.utc();
        let envelope = TaskEnvelope {
            id: TaskId::new(),
            task,
            attempt: 1,
            enqueued_at: now,
            available_at: options.delay.map_or(now, |delay| offset(now, delay)),
        };
        let id = envelope.id;
        let mut state = self.lock()?;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push(QueueEntry {
            seq,
            envelope,
            lease: None,
        });
        Ok(id)
    }

    async fn reserve(&self) -> QueueResult<Option<LeasedTask>> {
        let now = self.clock.utc();
        let leased_until = offset(now, self.lease_timeout);
        let mut state = self.lock()?;
        let next = state
            .pending
            .iter_mut()
            .filter(|entry| entry.visible_at() <= now)
            .min_by_key(|entry| (entry.envelope.available_at, entry.seq));
        let Some(entry) = next else {
            return Ok(None);
        };
        if entry.lease.is_some() {
            // The previous holder's lease lapsed without settling.
            entry.envelope.attempt = entry.envelope.attempt.saturating_add(1);
        }
        let lease_id = LeaseId::new();
        entry.lease = Some((lease_id, leased_until));
        Ok(Some(LeasedTask {
            lease_id,
            envelope: entry.envelope.clone(),
            leased_until,
        }))
    }

    async fn complete(&self, lease: &LeasedTask) -> QueueResult<()> {
        let mut state = self.lock()?;
        let entry = Self::take_leased(&mut state, lease)?;
        state.completed.push(entry.envelope);
        Ok(())
    }

    async fn reschedule(&self, lease: &LeasedTask, delay: Duration) -> QueueResult<()> {
        let now = self.clock.utc();
        let mut state = self.lock()?;
        let mut entry = Self::take_leased(&mut state, lease)?;
        entry.lease = None;
        entry.envelope.attempt = entry.envelope.attempt.saturating_add(1);
        entry.envelope.available_at = offset(now, delay);
        state.pending.push(entry);
        Ok(())
    }

    async fn fail(&self, lease: &LeasedTask, reason: &str) -> QueueResult<()> {
        let mut state = self.lock()?;
        let entry = Self::take_leased(&mut state, lease)?;
        state.failed.push(FailedTask {
            envelope: entry.envelope,
            reason: reason.to_owned(),
        });
        Ok(())
    }

    async fn depth(&self) -> QueueResult<usize> {
        Ok(self.lock()?.pending.len())
    }
}
