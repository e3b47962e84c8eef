//! Task queue tests against a live database.

use super::cluster::{BoxError, start_database};
use crate::test_helpers::ManualClock;
use snapenv::dispatch::{
    EnqueueOptions, PostgresTaskQueue, QueueError, ReconciliationTask, TaskQueue,
};
use snapenv::preview::domain::{ApplicationName, PrAction, PullRequestId};
use std::sync::Arc;
use std::time::Duration;

const LEASE_TIMEOUT: Duration = Duration::from_secs(60);

fn poll_task() -> ReconciliationTask {
    ReconciliationTask::Poll {
        pr_id: PullRequestId::new(),
        app_name: ApplicationName::new("snapenv-pr-61").expect("valid application name"),
        generation: 3,
    }
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "starts an embedded PostgreSQL server"]
async fn reserved_task_is_hidden_until_settled() -> Result<(), BoxError> {
    let database = start_database().await?;
    let clock = Arc::new(ManualClock::new());
    let queue = PostgresTaskQueue::new(database.pool.clone(), Arc::clone(&clock), LEASE_TIMEOUT);
    let task = poll_task();
    let id = queue.enqueue(task.clone(), EnqueueOptions::new()).await?;

    let lease = queue.reserve().await?.expect("visible task");
    assert_eq!(lease.envelope.id, id);
    assert_eq!(lease.envelope.task, task);
    assert_eq!(lease.envelope.attempt, 1);
    assert!(queue.reserve().await?.is_none());
    assert_eq!(queue.depth().await?, 1);

    queue.complete(&lease).await?;
    assert_eq!(queue.depth().await?, 0);
    let repeated = queue.complete(&lease).await;
    assert!(matches!(repeated, Err(QueueError::LeaseLost(lost)) if lost == id));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "starts an embedded PostgreSQL server"]
async fn reschedule_delays_and_counts_attempts() -> Result<(), BoxError> {
    let database = start_database().await?;
    let clock = Arc::new(ManualClock::new());
    let queue = PostgresTaskQueue::new(database.pool.clone(), Arc::clone(&clock), LEASE_TIMEOUT);
    queue
        .enqueue(
            ReconciliationTask::HandlePrEvent {
                pr_id: PullRequestId::new(),
                action: PrAction::Synchronize,
            },
            EnqueueOptions::new(),
        )
        .await?;
    let lease = queue.reserve().await?.expect("visible task");

    queue.reschedule(&lease, Duration::from_secs(15)).await?;

    assert!(queue.reserve().await?.is_none());
    clock.advance(Duration::from_secs(15));
    let retried = queue.reserve().await?.expect("task visible after delay");
    assert_eq!(retried.envelope.id, lease.envelope.id);
    assert_eq!(retried.envelope.attempt, 2);
    assert!(matches!(
        queue.complete(&lease).await,
        Err(QueueError::LeaseLost(_))
    ));
    queue.fail(&retried, "gave up").await?;
    assert_eq!(queue.depth().await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "starts an embedded PostgreSQL server"]
async fn expired_lease_is_handed_to_the_next_reserver() -> Result<(), BoxError> {
    let database = start_database().await?;
    let clock = Arc::new(ManualClock::new());
    let first_worker =
        PostgresTaskQueue::new(database.pool.clone(), Arc::clone(&clock), LEASE_TIMEOUT);
    let second_worker =
        PostgresTaskQueue::new(database.pool.clone(), Arc::clone(&clock), LEASE_TIMEOUT);
    first_worker
        .enqueue(poll_task(), EnqueueOptions::new())
        .await?;
    let abandoned = first_worker.reserve().await?.expect("visible task");
    assert!(second_worker.reserve().await?.is_none());

    clock.advance(LEASE_TIMEOUT + Duration::from_secs(1));
    let taken_over = second_worker.reserve().await?.expect("redelivered task");

    assert_eq!(taken_over.envelope.id, abandoned.envelope.id);
    assert_ne!(taken_over.lease_id, abandoned.lease_id);
    assert_eq!(taken_over.envelope.attempt, abandoned.envelope.attempt + 1);
    assert!(matches!(
        first_worker.complete(&abandoned).await,
        Err(QueueError::LeaseLost(_))
    ));
    second_worker.complete(&taken_over).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "starts an embedded PostgreSQL server"]
async fn concurrent_reservers_split_the_backlog() -> Result<(), BoxError> {
    let database = start_database().await?;
    let clock = Arc::new(ManualClock::new());
    let queue = Arc::new(PostgresTaskQueue::new(
        database.pool.clone(),
        Arc::clone(&clock),
        LEASE_TIMEOUT,
    ));
    for _ in 0..8 {
        queue.enqueue(poll_task(), EnqueueOptions::new()).await?;
    }

    let reservers: Vec<_> = (0..4)
        .map(|_| {
            let worker = Arc::clone(&queue);
            tokio::spawn(async move {
                let mut taken = Vec::new();
                while let Some(lease) = worker.reserve().await? {
                    taken.push(lease.envelope.id);
                }
                Ok::<_, QueueError>(taken)
            })
        })
        .collect();
    let mut all = Vec::new();
    for reserver in reservers {
        all.extend(reserver.await??);
    }

    all.sort_by_key(|id| id.into_inner());
    let total = all.len();
    all.dedup();
    assert_eq!(total, 8);
    assert_eq!(all.len(), 8);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "starts an embedded PostgreSQL server"]
async fn delayed_enqueue_is_not_visible_early() -> Result<(), BoxError> {
    let database = start_database().await?;
    let clock = Arc::new(ManualClock::new());
    let queue = PostgresTaskQueue::new(database.pool.clone(), Arc::clone(&clock), LEASE_TIMEOUT);
    queue
        .enqueue(
            poll_task(),
            EnqueueOptions::new().with_delay(Duration::from_secs(30)),
        )
        .await?;

    assert!(queue.reserve().await?.is_none());
    clock.advance(Duration::from_secs(30));
    assert!(queue.reserve().await?.is_some());
    Ok(())
}
