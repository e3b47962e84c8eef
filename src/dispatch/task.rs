//! Reconciliation task model and queue envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::preview::domain::{ApplicationName, ParseEnumError, PrAction, PullRequestId};

/// Unique identifier of an enqueued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new random task identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a task identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one reservation of a task.
///
/// Settling a task requires the lease that reserved it, so a worker whose
/// lease expired cannot settle the redelivered copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(Uuid);

impl LeaseId {
    /// Creates a new random lease identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a lease identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for LeaseId {
    fn default() -> Self {
        Self::new()
    }
}

/// Work item of the reconciliation workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconciliationTask {
    /// Route a pull request event to deploy or destroy.
    HandlePrEvent {
        /// Pull request the event concerns.
        pr_id: PullRequestId,
        /// Webhook action.
        action: PrAction,
    },
    /// Create or update the preview environment.
    Deploy {
        /// Pull request to deploy.
        pr_id: PullRequestId,
    },
    /// Tear the preview environment down.
    Destroy {
        /// Pull request to tear down.
        pr_id: PullRequestId,
    },
    /// Observe controller health until the deploy converges.
    Poll {
        /// Pull request being deployed.
        pr_id: PullRequestId,
        /// Controller application to observe.
        app_name: ApplicationName,
        /// Environment generation the deploy produced.
        generation: u64,
    },
}

impl ReconciliationTask {
    /// Returns the task kind.
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        match self {
            Self::HandlePrEvent { .. } => TaskKind::HandlePrEvent,
            Self::Deploy { .. } => TaskKind::Deploy,
            Self::Destroy { .. } => TaskKind::Destroy,
            Self::Poll { .. } => TaskKind::Poll,
        }
    }

    /// Returns the pull request the task concerns.
    #[must_use]
    pub const fn pr_id(&self) -> PullRequestId {
        match self {
            Self::HandlePrEvent { pr_id, .. }
            | Self::Deploy { pr_id }
            | Self::Destroy { pr_id }
            | Self::Poll { pr_id, .. } => *pr_id,
        }
    }
}

/// Discriminant of [`ReconciliationTask`], used to select retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// [`ReconciliationTask::HandlePrEvent`].
    HandlePrEvent,
    /// [`ReconciliationTask::Deploy`].
    Deploy,
    /// [`ReconciliationTask::Destroy`].
    Destroy,
    /// [`ReconciliationTask::Poll`].
    Poll,
}

impl TaskKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HandlePrEvent => "handle_pr_event",
            Self::Deploy => "deploy",
            Self::Destroy => "destroy",
            Self::Poll => "poll",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskKind {
    type Error = ParseEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "handle_pr_event" => Ok(Self::HandlePrEvent),
            "deploy" => Ok(Self::Deploy),
            "destroy" => Ok(Self::Destroy),
            "poll" => Ok(Self::Poll),
            _ => Err(ParseEnumError::new("task kind", value)),
        }
    }
}

/// Task plus delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Task identifier, stable across retries.
    pub id: TaskId,
    /// Work item.
    pub task: ReconciliationTask,
    /// Execution number, starting at 1.
    pub attempt: u32,
    /// When the task was first enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Earliest time the task may be reserved.
    pub available_at: DateTime<Utc>,
}

impl TaskEnvelope {
    /// Returns the task kind.
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        self.task.kind()
    }
}

/// A reserved task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasedTask {
    /// Reservation identifier.
    pub lease_id: LeaseId,
    /// Reserved task.
    pub envelope: TaskEnvelope,
    /// When the reservation lapses and the task becomes visible again.
    pub leased_until: DateTime<Utc>,
}
