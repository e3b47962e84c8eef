//! When steps for preview reconciliation BDD scenarios.

use super::world::{ReconciliationWorld, run_async};
use crate::test_helpers::pull_request_details;
use eyre::WrapErr;
use rstest_bdd_macros::when;
use snapenv::preview::{domain::PrAction, services::PullRequestEvent};

#[when(r#"pull request #{number:u64} is "{action}""#)]
fn pull_request_action(
    world: &mut ReconciliationWorld,
    number: u64,
    action: String,
) -> Result<(), eyre::Report> {
    let event = PullRequestEvent::new(PrAction::parse(&action), pull_request_details(number));
    let receipt = run_async(world.intake.record(event))
        .wrap_err_with(|| format!("record {action} event for PR #{number}"))?;
    world.last_receipt = Some(receipt);
    Ok(())
}

#[when("the dispatcher drains the queue")]
fn dispatcher_drains(world: &mut ReconciliationWorld) -> Result<(), eyre::Report> {
    run_async(world.drain())
}
