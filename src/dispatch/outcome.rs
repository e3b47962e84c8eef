//! Step outcomes reported by task handlers and settled by the dispatcher.

use std::fmt;
use std::time::Duration;

use super::{ReconciliationTask, TaskId, TaskKind};
use crate::preview::domain::{ApplicationHealth, ApplicationName, PrAction};

/// Terminal result of a successful step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowResult {
    /// A pull request event was routed to a follow-up task.
    Dispatched {
        /// Routed action.
        action: PrAction,
        /// Kind of the follow-up.
        follow_up: TaskKind,
    },
    /// A pull request event needed no work.
    Ignored {
        /// Ignored action.
        action: PrAction,
    },
    /// A deployment was submitted and polling scheduled.
    Deploying {
        /// Controller application.
        app_name: ApplicationName,
        /// Public URL.
        url: String,
        /// Environment generation.
        generation: u64,
    },
    /// Teardown found no live environment.
    Skipped,
    /// The environment was torn down.
    Destroyed {
        /// Controller application.
        app_name: ApplicationName,
    },
    /// The environment became healthy.
    Ready {
        /// Controller application.
        app_name: ApplicationName,
    },
    /// The environment converged unhealthy.
    Failed {
        /// Controller application.
        app_name: ApplicationName,
        /// Observed health.
        health: ApplicationHealth,
    },
    /// The poll targeted a superseded deploy and was discarded.
    Superseded {
        /// Generation the poll was scheduled for.
        generation: u64,
        /// Generation of the live environment.
        current: u64,
    },
    /// The poll found no live environment for the application.
    NoEnvironment {
        /// Controller application.
        app_name: ApplicationName,
    },
}

impl fmt::Display for WorkflowResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dispatched { action, follow_up } => {
                write!(f, "dispatched {action} to {follow_up}")
            }
            Self::Ignored { action } => write!(f, "ignored {action}"),
            Self::Deploying { app_name, .. } => write!(f, "deploying {app_name}"),
            Self::Skipped => f.write_str("skipped"),
            Self::Destroyed { app_name } => write!(f, "destroyed {app_name}"),
            Self::Ready { app_name } => write!(f, "ready {app_name}"),
            Self::Failed { app_name, health } => write!(f, "failed {app_name}: {health}"),
            Self::Superseded {
                generation,
                current,
            } => write!(f, "superseded generation {generation} by {current}"),
            Self::NoEnvironment { app_name } => write!(f, "no environment for {app_name}"),
        }
    }
}

/// Why a step should run again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReason {
    /// A collaborator failed; the whole step is retried.
    Transient(String),
    /// The controller has not converged yet.
    NotConverged(ApplicationHealth),
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(message) => write!(f, "transient failure: {message}"),
            Self::NotConverged(health) => write!(f, "not converged: {health}"),
        }
    }
}

/// Result of running one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step finished; follow-ups are enqueued before the task is acked.
    Done {
        /// Terminal result.
        result: WorkflowResult,
        /// Tasks to enqueue.
        follow_ups: Vec<ReconciliationTask>,
    },
    /// The step should run again after the policy delay.
    Retryable(RetryReason),
    /// The step cannot succeed; the task fails without retry.
    Fatal(String),
}

impl StepOutcome {
    /// Finished step without follow-ups.
    #[must_use]
    pub const fn done(result: WorkflowResult) -> Self {
        Self::Done {
            result,
            follow_ups: Vec::new(),
        }
    }

    /// Finished step with one follow-up.
    #[must_use]
    pub fn then(result: WorkflowResult, follow_up: ReconciliationTask) -> Self {
        Self::Done {
            result,
            follow_ups: vec![follow_up],
        }
    }
}

/// How the dispatcher settled a task execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDisposition {
    /// The task finished and was acked.
    Completed(WorkflowResult),
    /// The task will run again.
    Rescheduled {
        /// Delay before the next execution.
        delay: Duration,
        /// Retry reason.
        reason: RetryReason,
    },
    /// The attempt budget ran out while the controller was still converging.
    TimedOut,
    /// The task failed permanently.
    Failed(String),
}

/// Report of one execution, returned by `Dispatcher::run_once`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    /// Task identifier.
    pub task_id: TaskId,
    /// Task kind.
    pub kind: TaskKind,
    /// Execution number.
    pub attempt: u32,
    /// Settlement.
    pub disposition: TaskDisposition,
}
