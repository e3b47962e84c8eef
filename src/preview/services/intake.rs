//! Intake of normalized pull request events.

use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::dispatch::{EnqueueOptions, QueueError, ReconciliationTask, TaskId, TaskQueue};
use crate::preview::{
    domain::{
        Event, EventType, Pipeline, PrAction, PreviewDomainError, PullRequest,
        PullRequestDetails, PullRequestId,
    },
    ports::{ChangeSet, EventSink, PreviewStore, StoreError},
};

/// Pull request event as produced by the webhook receiver after signature
/// checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestEvent {
    /// Webhook action.
    pub action: PrAction,
    /// Pull request metadata carried by the payload.
    pub details: PullRequestDetails,
    /// Whether a `closed` pull request was merged.
    pub merged: bool,
}

impl PullRequestEvent {
    /// Creates an event for an unmerged pull request.
    #[must_use]
    pub const fn new(action: PrAction, details: PullRequestDetails) -> Self {
        Self {
            action,
            details,
            merged: false,
        }
    }

    /// Marks the pull request as merged.
    #[must_use]
    pub const fn merged(mut self, merged: bool) -> Self {
        self.merged = merged;
        self
    }
}

/// Outcome of recording a pull request event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeReceipt {
    /// The action is not tracked; nothing was persisted.
    Ignored {
        /// Ignored action.
        action: PrAction,
    },
    /// The event was recorded and reconciliation enqueued.
    Accepted {
        /// Tracked pull request.
        pr_id: PullRequestId,
        /// Enqueued dispatch task.
        task_id: TaskId,
        /// Recorded action.
        action: PrAction,
    },
}

/// Errors raised while recording a pull request event.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// Payload validation failed.
    #[error(transparent)]
    Domain(#[from] PreviewDomainError),
    /// The store rejected the write.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The dispatch task could not be enqueued.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Result type for intake operations.
pub type IntakeResult<T> = Result<T, IntakeError>;

/// Records pull request events and hands them to the dispatcher.
#[derive(Clone)]
pub struct PullRequestIntakeService<S, Q, E, C>
where
    S: PreviewStore,
    Q: TaskQueue,
    E: EventSink,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    queue: Arc<Q>,
    events: Arc<E>,
    clock: Arc<C>,
}

impl<S, Q, E, C> PullRequestIntakeService<S, Q, E, C>
where
    S: PreviewStore,
    Q: TaskQueue,
    E: EventSink,
    C: Clock + Send + Sync,
{
    /// Creates an intake service.
    #[must_use]
    pub const fn new(store: Arc<S>, queue: Arc<Q>, events: Arc<E>, clock: Arc<C>) -> Self {
        Self {
            store,
            queue,
            events,
            clock,
        }
    }

    /// Upserts the pull request, records a pipeline for deploy-triggering
    /// actions, appends a lifecycle event and enqueues its dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError`] when the payload is invalid, the store rejects
    /// the change set, or the dispatch task cannot be enqueued. In the last
    /// case the recorded state is already committed.
    pub async fn record(&self, event: PullRequestEvent) -> IntakeResult<IntakeReceipt> {
        let PullRequestEvent {
            action,
            details,
            merged,
        } = event;
        if !action.is_tracked() {
            info!(action = %action, "ignoring pull request action");
            return Ok(IntakeReceipt::Ignored { action });
        }
        info!(
            repository = %details.repository,
            number = %details.number,
            action = %action,
            "received pull request event"
        );

        let clock = &*self.clock;
        let existing = self
            .store
            .find_pull_request_by_number(&details.repository, details.number)
            .await?;
        let (mut pull_request, is_new) = match existing {
            Some(mut tracked) => {
                tracked.refresh(details.title, details.commit_sha, clock)?;
                (tracked, false)
            }
            None => (PullRequest::track(details, clock)?, true),
        };
        match action {
            PrAction::Closed => pull_request.close(merged, clock),
            PrAction::Reopened => pull_request.reopen(clock),
            _ => {}
        }

        let pr_id = pull_request.id();
        let pipeline = action
            .triggers_deploy()
            .then(|| Pipeline::pending(pr_id, pull_request.commit_sha().cloned(), clock));
        let mut lifecycle_event = Event::new(
            lifecycle_event_type(&action, merged),
            format!(
                "PR #{} {action}: {}",
                pull_request.number(),
                pull_request.details().title
            ),
            clock,
        )
        .for_pull_request(pr_id);
        if let Some(run) = &pipeline {
            lifecycle_event = lifecycle_event.for_pipeline(run.id());
        }

        let mut changes = if is_new {
            ChangeSet::new().insert_pull_request(pull_request)
        } else {
            ChangeSet::new().update_pull_request(pull_request)
        };
        if let Some(run) = pipeline {
            changes = changes.insert_pipeline(run);
        }
        self.store
            .apply(changes.append_event(lifecycle_event.clone()))
            .await?;
        if let Err(err) = self.events.publish(&lifecycle_event).await {
            warn!(event_id = %lifecycle_event.id(), error = %err, "failed to publish event");
        }

        let task_id = self
            .queue
            .enqueue(
                ReconciliationTask::HandlePrEvent {
                    pr_id,
                    action: action.clone(),
                },
                EnqueueOptions::new(),
            )
            .await?;
        info!(pr_id = %pr_id, task_id = %task_id, action = %action, "pull request event accepted");
        Ok(IntakeReceipt::Accepted {
            pr_id,
            task_id,
            action,
        })
    }
}

const fn lifecycle_event_type(action: &PrAction, merged: bool) -> EventType {
    match action {
        PrAction::Opened => EventType::PrOpened,
        PrAction::Closed if merged => EventType::PrMerged,
        PrAction::Closed => EventType::PrClosed,
        PrAction::Reopened => EventType::PrReopened,
        PrAction::Synchronize | PrAction::Other(_) => EventType::PrUpdated,
    }
}
