//! `PostgreSQL` task queue using `FOR UPDATE SKIP LOCKED` reservations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_types::{Timestamptz, Uuid as SqlUuid};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;

use super::{
    models::{NewTaskRow, ReservedTaskRow},
    schema::reconciliation_tasks,
};
use crate::dispatch::{
    EnqueueOptions, LeaseId, LeasedTask, QueueError, QueueResult, ReconciliationTask,
    TaskEnvelope, TaskId, TaskQueue,
};

/// `PostgreSQL` connection pool type for the task queue.
pub type QueuePgPool = Pool<ConnectionManager<PgConnection>>;

const PENDING: &str = "pending";
const COMPLETED: &str = "completed";
const FAILED: &str = "failed";

const RESERVE_SQL: &str = r"
WITH next_task AS (
    SELECT id
    FROM reconciliation_tasks
    WHERE status = 'pending'
      AND available_at <= $1
      AND (leased_until IS NULL OR leased_until <= $1)
    ORDER BY available_at, enqueued_at
    LIMIT 1
    FOR UPDATE SKIP LOCKED
)
UPDATE reconciliation_tasks AS task
SET attempt = CASE WHEN task.lease_id IS NULL THEN task.attempt ELSE task.attempt + 1 END,
    lease_id = $2,
    leased_until = $3,
    updated_at = $1
FROM next_task
WHERE task.id = next_task.id
RETURNING task.id, task.payload, task.attempt, task.enqueued_at, task.available_at
";

/// Durable task queue backed by the `reconciliation_tasks` table.
///
/// Any number of workers, in any number of processes, may reserve from the
/// same table; a row is handed to one reserver at a time.
#[derive(Debug, Clone)]
pub struct PostgresTaskQueue<C> {
    pool: QueuePgPool,
    clock: Arc<C>,
    lease_timeout: Duration,
}

fn offset(at: DateTime<Utc>, delay: Duration) -> QueueResult<DateTime<Utc>> {
    let delta = chrono::Duration::from_std(delay).map_err(QueueError::backend)?;
    at.checked_add_signed(delta)
        .ok_or_else(|| QueueError::Payload(format!("delay {delay:?} overflows the timestamp")))
}

impl<C: Clock + Send + Sync + 'static> PostgresTaskQueue<C> {
    /// Creates a queue over the given pool.
    #[must_use]
    pub const fn new(pool: QueuePgPool, clock: Arc<C>, lease_timeout: Duration) -> Self {
        Self {
            pool,
            clock,
            lease_timeout,
        }
    }

    async fn run_blocking<F, T>(&self, operation: F) -> QueueResult<T>
    where
        F: FnOnce(&mut PgConnection) -> QueueResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(QueueError::backend)?;
            operation(&mut connection)
        })
        .await
        .map_err(QueueError::backend)?
    }

    async fn settle<F>(&self, lease: &LeasedTask, update: F) -> QueueResult<()>
    where
        F: FnOnce(&mut PgConnection, uuid::Uuid, uuid::Uuid) -> QueryResult<usize>
            + Send
            + 'static,
    {
        let task_id = lease.envelope.id;
        let lease_id = lease.lease_id.into_inner();
        let updated = self
            .run_blocking(move |connection| {
                update(connection, task_id.into_inner(), lease_id).map_err(QueueError::backend)
            })
            .await?;
        if updated == 0 {
            return Err(QueueError::LeaseLost(task_id));
        }
        Ok(())
    }
}

#[async_trait]
impl<C: Clock + Send + Sync + 'static> TaskQueue for PostgresTaskQueue<C> {
    async fn enqueue(
        &self,
        task: ReconciliationTask,
        options: EnqueueOptions,
    ) -> QueueResult<TaskId> {
        let now = self.clock.utc();
        let available_at = match options.delay {
            Some(delay) => offset(now, delay)?,
            None => now,
        };
        let id = TaskId::new();
        let payload =
            serde_json::to_value(&task).map_err(|err| QueueError::Payload(err.to_string()))?;
        let row = NewTaskRow {
            id: id.into_inner(),
            kind: task.kind().as_str().to_owned(),
            payload,
            status: PENDING.to_owned(),
            attempt: 1,
            enqueued_at: now,
            available_at,
            updated_at: now,
        };
        self.run_blocking(move |connection| {
            diesel::insert_into(reconciliation_tasks::table)
                .values(&row)
                .execute(connection)
                .map_err(QueueError::backend)?;
            Ok(())
        })
        .await?;
        Ok(id)
    }

    async fn reserve(&self) -> QueueResult<Option<LeasedTask>> {
        let now = self.clock.utc();
        let leased_until = offset(now, self.lease_timeout)?;
        let lease_id = LeaseId::new();
        let row = self
            .run_blocking(move |connection| {
                diesel::sql_query(RESERVE_SQL)
                    .bind::<Timestamptz, _>(now)
                    .bind::<SqlUuid, _>(lease_id.into_inner())
                    .bind::<Timestamptz, _>(leased_until)
                    .get_result::<ReservedTaskRow>(connection)
                    .optional()
                    .map_err(QueueError::backend)
            })
            .await?;
        let Some(reserved) = row else {
            return Ok(None);
        };
        let task: ReconciliationTask = serde_json::from_value(reserved.payload)
            .map_err(|err| QueueError::Payload(err.to_string()))?;
        let attempt = u32::try_from(reserved.attempt).map_err(QueueError::backend)?;
        Ok(Some(LeasedTask {
            lease_id,
            envelope: TaskEnvelope {
                id: TaskId::from_uuid(reserved.id),
                task,
                attempt,
                enqueued_at: reserved.enqueued_at,
                available_at: reserved.available_at,
            },
            leased_until,
        }))
    }

    async fn complete(&self, lease: &LeasedTask) -> QueueResult<()> {
        let now = self.clock.utc();
        self.settle(lease, move |connection, task_id, lease_id| {
            diesel::update(
                reconciliation_tasks::table
                    .filter(reconciliation_tasks::id.eq(task_id))
                    .filter(reconciliation_tasks::lease_id.eq(lease_id))
                    .filter(reconciliation_tasks::status.eq(PENDING)),
            )
                .set((
                    reconciliation_tasks::status.eq(COMPLETED),
                    reconciliation_tasks::lease_id.eq(None::<uuid::Uuid>),
                    reconciliation_tasks::leased_until.eq(None::<DateTime<Utc>>),
                    reconciliation_tasks::updated_at.eq(now),
                ))
                .execute(connection)
        })
        .await
    }

    async fn reschedule(&self, lease: &LeasedTask, delay: Duration) -> QueueResult<()> {
        let now = self.clock.utc();
        let available_at = offset(now, delay)?;
        self.settle(lease, move |connection, task_id, lease_id| {
            diesel::update(
                reconciliation_tasks::table
                    .filter(reconciliation_tasks::id.eq(task_id))
                    .filter(reconciliation_tasks::lease_id.eq(lease_id))
                    .filter(reconciliation_tasks::status.eq(PENDING)),
            )
                .set((
                    reconciliation_tasks::attempt.eq(reconciliation_tasks::attempt + 1),
                    reconciliation_tasks::available_at.eq(available_at),
                    reconciliation_tasks::lease_id.eq(None::<uuid::Uuid>),
                    reconciliation_tasks::leased_until.eq(None::<DateTime<Utc>>),
                    reconciliation_tasks::updated_at.eq(now),
                ))
                .execute(connection)
        })
        .await
    }

    async fn fail(&self, lease: &LeasedTask, reason: &str) -> QueueResult<()> {
        let now = self.clock.utc();
        let reason_text = reason.to_owned();
        self.settle(lease, move |connection, task_id, lease_id| {
            diesel::update(
                reconciliation_tasks::table
                    .filter(reconciliation_tasks::id.eq(task_id))
                    .filter(reconciliation_tasks::lease_id.eq(lease_id))
                    .filter(reconciliation_tasks::status.eq(PENDING)),
            )
                .set((
                    reconciliation_tasks::status.eq(FAILED),
                    reconciliation_tasks::last_error.eq(Some(reason_text)),
                    reconciliation_tasks::lease_id.eq(None::<uuid::Uuid>),
                    reconciliation_tasks::leased_until.eq(None::<DateTime<Utc>>),
                    reconciliation_tasks::updated_at.eq(now),
                ))
                .execute(connection)
        })
        .await
    }

    async fn depth(&self) -> QueueResult<usize> {
        self.run_blocking(move |connection| {
            let count: i64 = reconciliation_tasks::table
                .filter(reconciliation_tasks::status.eq(PENDING))
                .count()
                .get_result(connection)
                .map_err(QueueError::backend)?;
            usize::try_from(count).map_err(QueueError::backend)
        })
        .await
    }
}
