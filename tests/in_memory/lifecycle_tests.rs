//! End-to-end deploy, poll and destroy flows against in-memory adapters.

use super::helpers::{Harness, harness, reports_of};
use rstest::rstest;
use snapenv::dispatch::{TaskDisposition, TaskKind, WorkflowResult};
use snapenv::preview::{
    adapters::memory::{ControllerCall, ScriptedDeploymentController},
    domain::{ApplicationHealth, EnvironmentStatus, EventType},
    ports::PreviewStore,
};

fn event_types(events: &[snapenv::preview::domain::Event]) -> Vec<EventType> {
    events.iter().map(|event| event.event_type()).collect()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn opened_pull_request_converges_to_running(harness: Harness) -> eyre::Result<()> {
    let receipt = harness.record("opened", 42).await?;
    let pr_id = Harness::accepted_pr_id(&receipt)?;

    let reports = harness.run_to_completion().await?;

    let kinds: Vec<TaskKind> = reports.iter().map(|report| report.kind).collect();
    assert_eq!(
        kinds,
        vec![TaskKind::HandlePrEvent, TaskKind::Deploy, TaskKind::Poll]
    );
    let environment = harness
        .store
        .find_live_environment(pr_id)
        .await?
        .ok_or_else(|| eyre::eyre!("expected a live environment"))?;
    assert_eq!(environment.status(), EnvironmentStatus::Running);
    assert_eq!(environment.app_name().as_str(), "snapenv-pr-42");
    assert_eq!(environment.namespace().as_str(), "pr-42");
    assert_eq!(environment.url(), "https://snapenv-pr-42.preview.localhost");

    let pull_request = harness.pull_request(42).await?;
    assert_eq!(
        pull_request.preview_url(),
        Some("https://snapenv-pr-42.preview.localhost")
    );
    let events = harness.store.list_events(pr_id).await?;
    assert_eq!(
        event_types(&events),
        vec![
            EventType::PrOpened,
            EventType::DeployStarted,
            EventType::EnvReady
        ]
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn progressing_health_is_polled_until_healthy() -> eyre::Result<()> {
    let harness = Harness::new(ScriptedDeploymentController::with_health_sequence([
        ApplicationHealth::Progressing,
        ApplicationHealth::Progressing,
        ApplicationHealth::Healthy,
    ]));
    let pr_id = Harness::accepted_pr_id(&harness.record("opened", 7).await?)?;

    let reports = harness.run_to_completion().await?;

    let polls = reports_of(&reports, TaskKind::Poll);
    assert_eq!(polls.len(), 3);
    assert!(matches!(
        polls.first().map(|report| &report.disposition),
        Some(TaskDisposition::Rescheduled { .. })
    ));
    let last = polls.last().ok_or_else(|| eyre::eyre!("no poll reports"))?;
    assert_eq!(last.attempt, 3);
    assert!(matches!(
        &last.disposition,
        TaskDisposition::Completed(WorkflowResult::Ready { .. })
    ));

    let environment = harness
        .store
        .find_live_environment(pr_id)
        .await?
        .ok_or_else(|| eyre::eyre!("expected a live environment"))?;
    assert_eq!(environment.status(), EnvironmentStatus::Running);
    let ready_events = harness
        .store
        .list_events(pr_id)
        .await?
        .into_iter()
        .filter(|event| event.event_type() == EventType::EnvReady)
        .count();
    assert_eq!(ready_events, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn degraded_health_marks_environment_failed() -> eyre::Result<()> {
    let harness = Harness::new(ScriptedDeploymentController::with_health_sequence([
        ApplicationHealth::Progressing,
        ApplicationHealth::Degraded,
    ]));
    let pr_id = Harness::accepted_pr_id(&harness.record("opened", 8).await?)?;

    let reports = harness.run_to_completion().await?;

    let polls = reports_of(&reports, TaskKind::Poll);
    assert_eq!(polls.len(), 2);
    let environment = harness
        .store
        .find_live_environment(pr_id)
        .await?
        .ok_or_else(|| eyre::eyre!("failed environments stay live"))?;
    assert_eq!(environment.status(), EnvironmentStatus::Failed);

    let failures: Vec<_> = harness
        .store
        .list_events(pr_id)
        .await?
        .into_iter()
        .filter(|event| event.event_type() == EventType::EnvFailed)
        .collect();
    assert_eq!(failures.len(), 1);
    let failure = failures
        .first()
        .ok_or_else(|| eyre::eyre!("expected an env_failed event"))?;
    assert!(failure.message().contains("snapenv-pr-8"));
    assert!(failure.message().contains("Degraded"));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn redeploy_reuses_the_live_environment(harness: Harness) -> eyre::Result<()> {
    let pr_id = Harness::accepted_pr_id(&harness.record("opened", 11).await?)?;
    harness.run_to_completion().await?;

    harness.record("synchronize", 11).await?;
    harness.run_to_completion().await?;

    let environments = harness.store.list_environments(pr_id).await?;
    assert_eq!(environments.len(), 1);
    let environment = environments
        .first()
        .ok_or_else(|| eyre::eyre!("expected one environment"))?;
    assert_eq!(environment.generation(), 2);
    assert_eq!(environment.status(), EnvironmentStatus::Running);

    let upserts = harness
        .controller
        .calls()
        .into_iter()
        .filter(|call| matches!(call, ControllerCall::Upsert(_)))
        .count();
    assert_eq!(upserts, 2);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn closing_destroys_the_environment(harness: Harness) -> eyre::Result<()> {
    let pr_id = Harness::accepted_pr_id(&harness.record("opened", 12).await?)?;
    harness.run_to_completion().await?;

    harness.record("closed", 12).await?;
    let reports = harness.run_to_completion().await?;

    let destroys = reports_of(&reports, TaskKind::Destroy);
    assert!(matches!(
        destroys.first().map(|report| &report.disposition),
        Some(TaskDisposition::Completed(WorkflowResult::Destroyed { app_name }))
            if app_name.as_str() == "snapenv-pr-12"
    ));
    assert!(harness.store.find_live_environment(pr_id).await?.is_none());
    let environments = harness.store.list_environments(pr_id).await?;
    let destroyed = environments
        .first()
        .ok_or_else(|| eyre::eyre!("destroyed environments are kept"))?;
    assert_eq!(destroyed.status(), EnvironmentStatus::Destroyed);
    assert!(destroyed.destroyed_at().is_some());

    let pull_request = harness.pull_request(12).await?;
    assert_eq!(pull_request.preview_url(), None);
    assert!(
        !harness
            .controller
            .has_application(destroyed.app_name())
    );
    let events = harness.store.list_events(pr_id).await?;
    assert_eq!(
        event_types(&events).last(),
        Some(&EventType::EnvDestroyed)
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn closing_without_environment_is_skipped(harness: Harness) -> eyre::Result<()> {
    let pr_id = Harness::accepted_pr_id(&harness.record("closed", 13).await?)?;

    let reports = harness.run_to_completion().await?;

    let destroys = reports_of(&reports, TaskKind::Destroy);
    assert_eq!(destroys.len(), 1);
    assert!(matches!(
        destroys.first().map(|report| &report.disposition),
        Some(TaskDisposition::Completed(WorkflowResult::Skipped))
    ));
    assert!(harness.controller.calls().is_empty());
    assert!(harness.store.list_environments(pr_id).await?.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reopening_after_destroy_creates_a_new_environment(harness: Harness) -> eyre::Result<()> {
    let pr_id = Harness::accepted_pr_id(&harness.record("opened", 14).await?)?;
    harness.run_to_completion().await?;
    harness.record("closed", 14).await?;
    harness.run_to_completion().await?;

    harness.record("reopened", 14).await?;
    harness.run_to_completion().await?;

    let environments = harness.store.list_environments(pr_id).await?;
    assert_eq!(environments.len(), 2);
    let statuses: Vec<_> = environments.iter().map(|env| env.status()).collect();
    assert_eq!(
        statuses,
        vec![EnvironmentStatus::Destroyed, EnvironmentStatus::Running]
    );
    let live = harness
        .store
        .find_live_environment(pr_id)
        .await?
        .ok_or_else(|| eyre::eyre!("expected a live environment"))?;
    assert_eq!(live.generation(), 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_pull_request_never_reaches_the_controller(harness: Harness) -> eyre::Result<()> {
    use snapenv::dispatch::{EnqueueOptions, ReconciliationTask, TaskQueue};
    use snapenv::preview::domain::PullRequestId;

    harness
        .queue
        .enqueue(
            ReconciliationTask::Deploy {
                pr_id: PullRequestId::new(),
            },
            EnqueueOptions::new(),
        )
        .await?;

    let reports = harness.run_to_completion().await?;

    assert_eq!(reports.len(), 1);
    assert!(matches!(
        reports.first().map(|report| &report.disposition),
        Some(TaskDisposition::Failed(message)) if message.contains("not found")
    ));
    assert!(harness.controller.calls().is_empty());
    assert_eq!(harness.queue.failed()?.len(), 1);
    Ok(())
}
