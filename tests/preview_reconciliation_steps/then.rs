//! Then steps for preview reconciliation BDD scenarios.

use super::world::{ReconciliationWorld, run_async};
use rstest_bdd_macros::then;
use snapenv::dispatch::{TaskDisposition, TaskKind, TaskQueue};
use snapenv::preview::{
    domain::{EnvironmentStatus, EventType},
    ports::PreviewStore,
    services::IntakeReceipt,
};

#[then(r#"pull request #{number:u64} has a "{status}" environment"#)]
fn has_environment_in_status(
    world: &ReconciliationWorld,
    number: u64,
    status: String,
) -> Result<(), eyre::Report> {
    let expected = EnvironmentStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid expected status in scenario: {err}"))?;
    let pr_id = world.pull_request_id(number)?;
    let environment = run_async(world.store.find_live_environment(pr_id))?
        .ok_or_else(|| eyre::eyre!("PR #{number} has no live environment"))?;
    eyre::ensure!(
        environment.status() == expected,
        "expected status {expected}, found {}",
        environment.status()
    );
    Ok(())
}

#[then("pull request #{number:u64} has no live environment")]
fn has_no_live_environment(world: &ReconciliationWorld, number: u64) -> Result<(), eyre::Report> {
    let pr_id = world.pull_request_id(number)?;
    let live = run_async(world.store.find_live_environment(pr_id))?;
    eyre::ensure!(live.is_none(), "expected no live environment, found {live:?}");
    Ok(())
}

#[then(r#"pull request #{number:u64} has {count:usize} "{event_type}" event"#)]
fn has_event_count(
    world: &ReconciliationWorld,
    number: u64,
    count: usize,
    event_type: String,
) -> Result<(), eyre::Report> {
    let expected = EventType::try_from(event_type.as_str())
        .map_err(|err| eyre::eyre!("invalid event type in scenario: {err}"))?;
    let pr_id = world.pull_request_id(number)?;
    let found = run_async(world.store.list_events(pr_id))?
        .iter()
        .filter(|event| event.event_type() == expected)
        .count();
    eyre::ensure!(
        found == count,
        "expected {count} {expected} events, found {found}"
    );
    Ok(())
}

#[then(
    "pull request #{number:u64} has exactly {count:usize} environment record at generation {generation:u64}"
)]
fn has_single_environment_at_generation(
    world: &ReconciliationWorld,
    number: u64,
    count: usize,
    generation: u64,
) -> Result<(), eyre::Report> {
    let pr_id = world.pull_request_id(number)?;
    let environments = run_async(world.store.list_environments(pr_id))?;
    eyre::ensure!(
        environments.len() == count,
        "expected {count} environment records, found {}",
        environments.len()
    );
    let latest = environments
        .last()
        .ok_or_else(|| eyre::eyre!("missing environment record"))?;
    eyre::ensure!(
        latest.generation() == generation,
        "expected generation {generation}, found {}",
        latest.generation()
    );
    Ok(())
}

#[then(r#"the preview URL of pull request #{number:u64} is "{url}""#)]
fn preview_url_is(
    world: &ReconciliationWorld,
    number: u64,
    url: String,
) -> Result<(), eyre::Report> {
    let pull_request = run_async(world.pull_request(number))?;
    eyre::ensure!(
        pull_request.preview_url() == Some(url.as_str()),
        "expected preview URL {url}, found {:?}",
        pull_request.preview_url()
    );
    Ok(())
}

#[then("pull request #{number:u64} has no preview URL")]
fn has_no_preview_url(world: &ReconciliationWorld, number: u64) -> Result<(), eyre::Report> {
    let pull_request = run_async(world.pull_request(number))?;
    eyre::ensure!(
        pull_request.preview_url().is_none(),
        "expected no preview URL, found {:?}",
        pull_request.preview_url()
    );
    Ok(())
}

#[then(r#"{count:usize} "{kind}" tasks ran"#)]
fn task_runs(world: &ReconciliationWorld, count: usize, kind: String) -> Result<(), eyre::Report> {
    let expected = TaskKind::try_from(kind.as_str())
        .map_err(|err| eyre::eyre!("invalid task kind in scenario: {err}"))?;
    let found = world
        .reports
        .iter()
        .filter(|report| report.kind == expected)
        .count();
    eyre::ensure!(found == count, "expected {count} {expected} runs, found {found}");
    Ok(())
}

#[then(r#"the last "{kind}" task timed out"#)]
fn last_task_timed_out(world: &ReconciliationWorld, kind: String) -> Result<(), eyre::Report> {
    let expected = TaskKind::try_from(kind.as_str())
        .map_err(|err| eyre::eyre!("invalid task kind in scenario: {err}"))?;
    let last = world
        .reports
        .iter()
        .rev()
        .find(|report| report.kind == expected)
        .ok_or_else(|| eyre::eyre!("no {expected} task ran"))?;
    eyre::ensure!(
        last.disposition == TaskDisposition::TimedOut,
        "expected a timeout, found {:?}",
        last.disposition
    );
    Ok(())
}

#[then("the event is ignored")]
fn event_is_ignored(world: &ReconciliationWorld) -> Result<(), eyre::Report> {
    let receipt = world
        .last_receipt
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing intake receipt"))?;
    eyre::ensure!(
        matches!(receipt, IntakeReceipt::Ignored { .. }),
        "expected the event to be ignored, got {receipt:?}"
    );
    Ok(())
}

#[then("the task queue is empty")]
fn task_queue_is_empty(world: &ReconciliationWorld) -> Result<(), eyre::Report> {
    let depth = run_async(world.queue.depth())?;
    eyre::ensure!(depth == 0, "expected an empty queue, found {depth} tasks");
    Ok(())
}
