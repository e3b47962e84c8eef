//! Webhook event intake against in-memory adapters.

use super::helpers::{Harness, harness};
use crate::test_helpers::pull_request_details;
use rstest::rstest;
use snapenv::dispatch::{ReconciliationTask, TaskQueue};
use snapenv::preview::{
    domain::{CommitSha, EventType, PrAction, PullRequestStatus},
    ports::PreviewStore,
    services::{IntakeError, IntakeReceipt, PullRequestEvent},
};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn untracked_actions_are_ignored(harness: Harness) -> eyre::Result<()> {
    let receipt = harness.record("labeled", 31).await?;

    assert_eq!(
        receipt,
        IntakeReceipt::Ignored {
            action: PrAction::parse("labeled")
        }
    );
    let details = pull_request_details(31);
    assert!(
        harness
            .store
            .find_pull_request_by_number(&details.repository, details.number)
            .await?
            .is_none()
    );
    assert_eq!(harness.queue.depth().await?, 0);
    assert!(harness.store.all_events()?.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn opened_event_records_pull_request_pipeline_and_event(
    harness: Harness,
) -> eyre::Result<()> {
    let mut subscriber = harness.events.subscribe();

    let receipt = harness.record("opened", 32).await?;

    let pr_id = Harness::accepted_pr_id(&receipt)?;
    let pull_request = harness.pull_request(32).await?;
    assert_eq!(pull_request.id(), pr_id);
    assert_eq!(pull_request.status(), PullRequestStatus::Open);

    let pipelines = harness.store.all_pipelines()?;
    assert_eq!(pipelines.len(), 1);
    let pipeline = pipelines
        .first()
        .ok_or_else(|| eyre::eyre!("expected a pipeline"))?;
    assert_eq!(pipeline.pull_request_id(), pr_id);
    assert_eq!(pipeline.commit_sha(), pull_request.commit_sha());

    let events = harness.store.list_events(pr_id).await?;
    assert_eq!(events.len(), 1);
    let event = events
        .first()
        .ok_or_else(|| eyre::eyre!("expected a lifecycle event"))?;
    assert_eq!(event.event_type(), EventType::PrOpened);
    assert_eq!(event.pipeline_id(), Some(pipeline.id()));
    assert_eq!(event.message(), "PR #32 opened: Preview change 32");

    let published = subscriber.recv().await?;
    assert_eq!(published.id(), event.id());

    let pending = harness.queue.pending()?;
    assert_eq!(pending.len(), 1);
    assert!(pending.first().is_some_and(|envelope| envelope.task
        == ReconciliationTask::HandlePrEvent {
            pr_id,
            action: PrAction::Opened,
        }));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn synchronize_refreshes_the_tracked_pull_request(harness: Harness) -> eyre::Result<()> {
    let first = Harness::accepted_pr_id(&harness.record("opened", 33).await?)?;
    let mut details = pull_request_details(33);
    details.title = "Preview change 33, take two".to_owned();
    details.commit_sha = Some(CommitSha::new("ffffffffffffffff")?);

    let receipt = harness
        .record_event(PullRequestEvent::new(PrAction::Synchronize, details))
        .await?;

    assert_eq!(Harness::accepted_pr_id(&receipt)?, first);
    let pull_request = harness.pull_request(33).await?;
    assert_eq!(pull_request.details().title, "Preview change 33, take two");
    assert_eq!(
        pull_request.commit_sha().map(CommitSha::as_str),
        Some("ffffffffffffffff")
    );
    assert_eq!(harness.store.all_pipelines()?.len(), 2);
    let last_event = harness
        .store
        .list_events(first)
        .await?
        .pop()
        .ok_or_else(|| eyre::eyre!("expected events"))?;
    assert_eq!(last_event.event_type(), EventType::PrUpdated);
    Ok(())
}

#[rstest]
#[case(true, EventType::PrMerged, PullRequestStatus::Merged)]
#[case(false, EventType::PrClosed, PullRequestStatus::Closed)]
#[tokio::test(flavor = "multi_thread")]
async fn closing_records_merge_state(
    harness: Harness,
    #[case] merged: bool,
    #[case] expected_event: EventType,
    #[case] expected_status: PullRequestStatus,
) -> eyre::Result<()> {
    harness.record("opened", 34).await?;

    let receipt = harness
        .record_event(
            PullRequestEvent::new(PrAction::Closed, pull_request_details(34)).merged(merged),
        )
        .await?;

    let pr_id = Harness::accepted_pr_id(&receipt)?;
    assert_eq!(harness.pull_request(34).await?.status(), expected_status);
    let last_event = harness
        .store
        .list_events(pr_id)
        .await?
        .pop()
        .ok_or_else(|| eyre::eyre!("expected events"))?;
    assert_eq!(last_event.event_type(), expected_event);
    assert_eq!(last_event.pipeline_id(), None);
    assert_eq!(harness.store.all_pipelines()?.len(), 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_commit_records_nothing(harness: Harness) -> eyre::Result<()> {
    harness.store.fail_next_event_append();

    let result = harness
        .intake
        .record(PullRequestEvent::new(
            PrAction::Opened,
            pull_request_details(35),
        ))
        .await;

    assert!(matches!(result, Err(IntakeError::Store(_))));
    let details = pull_request_details(35);
    assert!(
        harness
            .store
            .find_pull_request_by_number(&details.repository, details.number)
            .await?
            .is_none()
    );
    assert!(harness.store.all_pipelines()?.is_empty());
    assert_eq!(harness.queue.depth().await?, 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn invalid_payload_is_rejected(harness: Harness) -> eyre::Result<()> {
    let mut details = pull_request_details(36);
    details.author = "   ".to_owned();

    let result = harness
        .intake
        .record(PullRequestEvent::new(PrAction::Opened, details))
        .await;

    assert!(matches!(result, Err(IntakeError::Domain(_))));
    assert_eq!(harness.queue.depth().await?, 0);
    Ok(())
}
