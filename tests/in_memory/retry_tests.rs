//! Retry budgets, timeouts and at-least-once redelivery.

use super::helpers::{Harness, LEASE_TIMEOUT, harness, reports_of};
use crate::test_helpers::ManualClock;
use async_trait::async_trait;
use rstest::rstest;
use snapenv::dispatch::{
    Dispatcher, EnqueueOptions, InMemoryTaskQueue, QueueError, ReconciliationTask, RetryPolicies,
    RetryPolicy, RetryReason, StepOutcome, TaskDisposition, TaskEnvelope, TaskHandler, TaskKind,
    TaskQueue, WorkflowResult,
};
use snapenv::preview::{
    adapters::memory::ScriptedDeploymentController,
    domain::{ApplicationHealth, EnvironmentStatus, EventType, PullRequestId},
    ports::PreviewStore,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
async fn poll_times_out_after_the_attempt_budget() -> eyre::Result<()> {
    let harness = Harness::new(ScriptedDeploymentController::with_health_sequence([
        ApplicationHealth::Progressing,
    ]));
    let pr_id = Harness::accepted_pr_id(&harness.record("opened", 21).await?)?;

    let reports = harness.run_to_completion().await?;

    let polls = reports_of(&reports, TaskKind::Poll);
    let budget = RetryPolicies::default().poll.max_attempts;
    assert_eq!(polls.len(), usize::try_from(budget)?);
    let last = polls.last().ok_or_else(|| eyre::eyre!("no poll reports"))?;
    assert_eq!(last.attempt, budget);
    assert_eq!(last.disposition, TaskDisposition::TimedOut);

    let environment = harness
        .store
        .find_live_environment(pr_id)
        .await?
        .ok_or_else(|| eyre::eyre!("expected a live environment"))?;
    assert_eq!(environment.status(), EnvironmentStatus::Provisioning);
    let failed = harness.queue.failed()?;
    assert_eq!(failed.len(), 1);
    assert!(
        failed
            .first()
            .is_some_and(|task| task.reason.contains("Progressing"))
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_health_fails_the_deployment_by_default() -> eyre::Result<()> {
    let harness = Harness::new(ScriptedDeploymentController::with_health_sequence([
        ApplicationHealth::Unknown,
    ]));
    let pr_id = Harness::accepted_pr_id(&harness.record("opened", 22).await?)?;

    let reports = harness.run_to_completion().await?;

    assert_eq!(reports_of(&reports, TaskKind::Poll).len(), 1);
    let environment = harness
        .store
        .find_live_environment(pr_id)
        .await?
        .ok_or_else(|| eyre::eyre!("expected a live environment"))?;
    assert_eq!(environment.status(), EnvironmentStatus::Failed);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn transient_controller_failures_are_retried(harness: Harness) -> eyre::Result<()> {
    harness.controller.fail_next_upserts(2);
    let pr_id = Harness::accepted_pr_id(&harness.record("opened", 23).await?)?;

    let reports = harness.run_to_completion().await?;

    let deploys = reports_of(&reports, TaskKind::Deploy);
    assert_eq!(deploys.len(), 3);
    assert!(deploys.iter().take(2).all(|report| matches!(
        &report.disposition,
        TaskDisposition::Rescheduled {
            reason: RetryReason::Transient(_),
            ..
        }
    )));
    let environment = harness
        .store
        .find_live_environment(pr_id)
        .await?
        .ok_or_else(|| eyre::eyre!("expected a live environment"))?;
    assert_eq!(environment.status(), EnvironmentStatus::Running);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn exhausted_deploy_retries_fail_the_task(harness: Harness) -> eyre::Result<()> {
    harness.controller.fail_next_upserts(10);
    let pr_id = Harness::accepted_pr_id(&harness.record("opened", 24).await?)?;

    let reports = harness.run_to_completion().await?;

    let deploys = reports_of(&reports, TaskKind::Deploy);
    let budget = RetryPolicies::default().deploy.max_attempts;
    assert_eq!(deploys.len(), usize::try_from(budget)?);
    assert!(matches!(
        deploys.last().map(|report| &report.disposition),
        Some(TaskDisposition::Failed(message)) if message.contains("injected upsert failure")
    ));
    assert!(harness.store.list_environments(pr_id).await?.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_commit_leaves_no_partial_deploy(harness: Harness) -> eyre::Result<()> {
    let pr_id = Harness::accepted_pr_id(&harness.record("opened", 25).await?)?;
    let dispatched = harness
        .dispatcher
        .run_once()
        .await?
        .ok_or_else(|| eyre::eyre!("expected the dispatch task"))?;
    assert_eq!(dispatched.kind, TaskKind::HandlePrEvent);

    harness.store.fail_next_event_append();
    let deploy = harness
        .dispatcher
        .run_once()
        .await?
        .ok_or_else(|| eyre::eyre!("expected the deploy task"))?;

    assert_eq!(deploy.kind, TaskKind::Deploy);
    assert!(matches!(
        deploy.disposition,
        TaskDisposition::Rescheduled {
            reason: RetryReason::Transient(_),
            ..
        }
    ));
    assert!(harness.store.list_environments(pr_id).await?.is_empty());
    assert_eq!(harness.pull_request(25).await?.preview_url(), None);
    let event_types: Vec<_> = harness
        .store
        .list_events(pr_id)
        .await?
        .iter()
        .map(snapenv::preview::domain::Event::event_type)
        .collect();
    assert_eq!(event_types, vec![EventType::PrOpened]);

    harness.run_to_completion().await?;
    let environments = harness.store.list_environments(pr_id).await?;
    assert_eq!(environments.len(), 1);
    assert!(
        environments
            .first()
            .is_some_and(|env| env.status() == EnvironmentStatus::Running)
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn expired_lease_is_redelivered(harness: Harness) -> eyre::Result<()> {
    harness.record("closed", 26).await?;
    let abandoned = harness
        .queue
        .reserve()
        .await?
        .ok_or_else(|| eyre::eyre!("expected a visible task"))?;
    assert!(harness.dispatcher.run_once().await?.is_none());

    harness.clock.advance(LEASE_TIMEOUT + Duration::from_secs(1));
    let redelivered = harness
        .dispatcher
        .run_once()
        .await?
        .ok_or_else(|| eyre::eyre!("expected redelivery"))?;

    assert_eq!(redelivered.task_id, abandoned.envelope.id);
    assert_eq!(redelivered.attempt, abandoned.envelope.attempt + 1);
    assert!(matches!(
        redelivered.disposition,
        TaskDisposition::Completed(WorkflowResult::Dispatched { .. })
    ));
    let stale_ack = harness.queue.complete(&abandoned).await;
    assert!(matches!(stale_ack, Err(QueueError::LeaseLost(id)) if id == abandoned.envelope.id));
    Ok(())
}

#[derive(Debug, Default)]
struct CountsCalls {
    calls: AtomicU32,
}

#[async_trait]
impl TaskHandler for CountsCalls {
    async fn handle(&self, _envelope: &TaskEnvelope) -> StepOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StepOutcome::done(WorkflowResult::Skipped)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn repeatedly_abandoned_task_exhausts_its_budget() -> eyre::Result<()> {
    let clock = Arc::new(ManualClock::new());
    let queue = Arc::new(InMemoryTaskQueue::new(Arc::clone(&clock), LEASE_TIMEOUT));
    let handler = Arc::new(CountsCalls::default());
    let policies = RetryPolicies {
        destroy: RetryPolicy::new(2, Duration::from_secs(5)),
        ..RetryPolicies::default()
    };
    let dispatcher = Dispatcher::new(
        Arc::clone(&queue),
        Arc::clone(&handler),
        policies,
        Duration::from_millis(10),
    );
    queue
        .enqueue(
            ReconciliationTask::Destroy {
                pr_id: PullRequestId::new(),
            },
            EnqueueOptions::new(),
        )
        .await?;

    for expected_attempt in 1..=2 {
        let abandoned = queue
            .reserve()
            .await?
            .ok_or_else(|| eyre::eyre!("expected a visible task"))?;
        assert_eq!(abandoned.envelope.attempt, expected_attempt);
        clock.advance(LEASE_TIMEOUT + Duration::from_secs(1));
    }
    let report = dispatcher
        .run_once()
        .await?
        .ok_or_else(|| eyre::eyre!("expected the redelivered task"))?;

    assert_eq!(report.attempt, 3);
    assert!(matches!(
        report.disposition,
        TaskDisposition::Failed(ref reason) if reason.contains("abandoned")
    ));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    assert_eq!(queue.failed()?.len(), 1);
    assert_eq!(queue.depth().await?, 0);
    Ok(())
}

#[derive(Debug, Default)]
struct PanicsOnce {
    calls: AtomicU32,
}

#[async_trait]
impl TaskHandler for PanicsOnce {
    async fn handle(&self, _envelope: &TaskEnvelope) -> StepOutcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(call > 0, "handler crashed mid-step");
        StepOutcome::done(WorkflowResult::Skipped)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn crashed_handler_is_retried() -> eyre::Result<()> {
    let clock = Arc::new(ManualClock::new());
    let queue = Arc::new(InMemoryTaskQueue::new(Arc::clone(&clock), LEASE_TIMEOUT));
    let handler = Arc::new(PanicsOnce::default());
    let policies = RetryPolicies {
        destroy: RetryPolicy::new(2, Duration::from_secs(5)),
        ..RetryPolicies::default()
    };
    let dispatcher = Dispatcher::new(
        Arc::clone(&queue),
        Arc::clone(&handler),
        policies,
        Duration::from_millis(10),
    );
    queue
        .enqueue(
            ReconciliationTask::Destroy {
                pr_id: PullRequestId::new(),
            },
            EnqueueOptions::new(),
        )
        .await?;

    let first = dispatcher
        .run_once()
        .await?
        .ok_or_else(|| eyre::eyre!("expected a task"))?;
    assert!(matches!(
        first.disposition,
        TaskDisposition::Rescheduled {
            reason: RetryReason::Transient(_),
            ..
        }
    ));

    clock.advance(Duration::from_secs(5));
    let second = dispatcher
        .run_once()
        .await?
        .ok_or_else(|| eyre::eyre!("expected the retried task"))?;
    assert_eq!(second.attempt, 2);
    assert_eq!(
        second.disposition,
        TaskDisposition::Completed(WorkflowResult::Skipped)
    );
    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    assert_eq!(queue.completed()?.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn delayed_task_stays_hidden_until_due() -> eyre::Result<()> {
    let clock = Arc::new(ManualClock::new());
    let queue = InMemoryTaskQueue::new(Arc::clone(&clock), LEASE_TIMEOUT);
    queue
        .enqueue(
            ReconciliationTask::Destroy {
                pr_id: PullRequestId::new(),
            },
            EnqueueOptions::new().with_delay(Duration::from_secs(30)),
        )
        .await?;

    assert!(queue.reserve().await?.is_none());
    clock.advance(Duration::from_secs(30));
    assert!(queue.reserve().await?.is_some());
    assert_eq!(queue.depth().await?, 1);
    Ok(())
}
