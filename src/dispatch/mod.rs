//! Durable task dispatch for the reconciliation workflow.
//!
//! Tasks are enqueued with optional delays, reserved under a lease by worker
//! slots, and settled from the [`StepOutcome`] their handler reports:
//!
//! - Task model and envelopes in [`task`]
//! - Per-kind retry budgets in [`policy`]
//! - Step outcomes and reports in [`outcome`]
//! - The queue port in [`queue`], with [`memory`] and [`postgres`] adapters
//! - Worker slots in [`worker`]

pub mod memory;
pub mod outcome;
pub mod policy;
pub mod postgres;
pub mod queue;
pub mod task;
pub mod worker;

pub use memory::{FailedTask, InMemoryTaskQueue};
pub use outcome::{RetryReason, StepOutcome, TaskDisposition, TaskReport, WorkflowResult};
pub use policy::{RetryPolicies, RetryPolicy};
pub use postgres::{PostgresTaskQueue, QueuePgPool};
pub use queue::{EnqueueOptions, QueueError, QueueResult, TaskQueue};
pub use task::{LeaseId, LeasedTask, ReconciliationTask, TaskEnvelope, TaskId, TaskKind};
pub use worker::{Dispatcher, TaskHandler};
