//! Change-set atomicity and live-environment uniqueness.

use crate::test_helpers::pull_request_details;
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use snapenv::preview::{
    adapters::memory::InMemoryPreviewStore,
    domain::{
        ApplicationName, Environment, EnvironmentSpec, EnvironmentStatus, Event, EventType,
        Namespace, PullRequest, ResourceHints,
    },
    ports::{ChangeSet, EnvironmentStatusWrite, PreviewStore, StoreError},
};

#[fixture]
fn store() -> InMemoryPreviewStore {
    InMemoryPreviewStore::new()
}

fn tracked(number: u64) -> PullRequest {
    PullRequest::track(pull_request_details(number), &DefaultClock).expect("valid pull request")
}

fn environment_for(pull_request: &PullRequest, namespace: &str) -> Environment {
    Environment::provision(
        EnvironmentSpec {
            pull_request_id: pull_request.id(),
            namespace: Namespace::new(namespace).expect("valid namespace"),
            url: format!("https://snapenv-{namespace}.preview.localhost"),
            app_name: ApplicationName::new(format!("snapenv-{namespace}"))
                .expect("valid application name"),
            resource_hints: ResourceHints::default(),
        },
        &DefaultClock,
    )
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn second_live_environment_is_rejected(store: InMemoryPreviewStore) {
    let pull_request = tracked(41);
    let first = environment_for(&pull_request, "pr-41");
    store
        .apply(
            ChangeSet::new()
                .insert_pull_request(pull_request.clone())
                .insert_environment(first),
        )
        .await
        .expect("first environment");

    let result = store
        .apply(ChangeSet::new().insert_environment(environment_for(&pull_request, "pr-41b")))
        .await;

    assert!(matches!(
        result,
        Err(StoreError::DuplicateEnvironment(id)) if id == pull_request.id()
    ));
    let environments = store
        .list_environments(pull_request.id())
        .await
        .expect("list environments");
    assert_eq!(environments.len(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn live_namespace_cannot_be_shared(store: InMemoryPreviewStore) {
    let owner = tracked(42);
    let other = tracked(43);
    store
        .apply(
            ChangeSet::new()
                .insert_pull_request(owner.clone())
                .insert_pull_request(other.clone())
                .insert_environment(environment_for(&owner, "pr-42")),
        )
        .await
        .expect("seed");

    let result = store
        .apply(ChangeSet::new().insert_environment(environment_for(&other, "pr-42")))
        .await;

    assert!(matches!(result, Err(StoreError::DuplicateNamespace(ns)) if ns.as_str() == "pr-42"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn destroyed_environment_frees_its_slot(store: InMemoryPreviewStore) {
    let pull_request = tracked(44);
    let mut first = environment_for(&pull_request, "pr-44");
    store
        .apply(
            ChangeSet::new()
                .insert_pull_request(pull_request.clone())
                .insert_environment(first.clone()),
        )
        .await
        .expect("seed");
    first.tear_down(&DefaultClock).expect("tear down");
    store
        .apply(ChangeSet::new().update_environment(first))
        .await
        .expect("record teardown");

    store
        .apply(ChangeSet::new().insert_environment(environment_for(&pull_request, "pr-44")))
        .await
        .expect("fresh environment after teardown");

    let statuses: Vec<_> = store
        .list_environments(pull_request.id())
        .await
        .expect("list environments")
        .iter()
        .map(Environment::status)
        .collect();
    assert_eq!(
        statuses,
        vec![EnvironmentStatus::Destroyed, EnvironmentStatus::Provisioning]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rejected_change_set_writes_nothing(store: InMemoryPreviewStore) {
    let pull_request = tracked(45);
    store
        .apply(ChangeSet::new().insert_pull_request(pull_request.clone()))
        .await
        .expect("seed");

    let duplicate = PullRequest::track(pull_request_details(45), &DefaultClock)
        .expect("valid pull request");
    let event = Event::new(EventType::PrOpened, "PR #45 opened", &DefaultClock)
        .for_pull_request(pull_request.id());
    let result = store
        .apply(
            ChangeSet::new()
                .insert_environment(environment_for(&pull_request, "pr-45"))
                .insert_pull_request(duplicate)
                .append_event(event),
        )
        .await;

    assert!(matches!(result, Err(StoreError::DuplicatePullRequest { .. })));
    assert!(
        store
            .list_environments(pull_request.id())
            .await
            .expect("list environments")
            .is_empty()
    );
    assert!(store.all_events().expect("events").is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn update_of_unknown_environment_is_not_found(store: InMemoryPreviewStore) {
    let pull_request = tracked(46);
    store
        .apply(ChangeSet::new().insert_pull_request(pull_request.clone()))
        .await
        .expect("seed");

    let result = store
        .apply(ChangeSet::new().update_environment(environment_for(&pull_request, "pr-46")))
        .await;

    assert!(matches!(
        result,
        Err(StoreError::NotFound {
            kind: "environment",
            ..
        })
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn guarded_status_write_needs_the_observed_state(store: InMemoryPreviewStore) {
    let pull_request = tracked(45);
    let observed = environment_for(&pull_request, "pr-45");
    store
        .apply(
            ChangeSet::new()
                .insert_pull_request(pull_request.clone())
                .insert_environment(observed.clone()),
        )
        .await
        .expect("seed environment");
    let mut torn_down = observed.clone();
    torn_down.tear_down(&DefaultClock).expect("tear down");
    store
        .apply(ChangeSet::new().update_environment(torn_down))
        .await
        .expect("store teardown");

    let result = store
        .apply(
            ChangeSet::new()
                .set_environment_status(EnvironmentStatusWrite::from_observed(
                    &observed,
                    EnvironmentStatus::Failed,
                ))
                .append_event(
                    Event::new(EventType::EnvFailed, "failed", &DefaultClock)
                        .for_pull_request(pull_request.id()),
                ),
        )
        .await;

    assert!(matches!(
        result,
        Err(StoreError::StaleEnvironment {
            expected_generation: 1,
            current_generation: 1,
            ..
        })
    ));
    let environments = store
        .list_environments(pull_request.id())
        .await
        .expect("list environments");
    let statuses: Vec<_> = environments.iter().map(Environment::status).collect();
    assert_eq!(statuses, vec![EnvironmentStatus::Destroyed]);
    assert!(
        store
            .list_events(pull_request.id())
            .await
            .expect("list events")
            .is_empty()
    );
}
