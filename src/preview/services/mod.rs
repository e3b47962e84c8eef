//! Application services for preview reconciliation.

mod intake;
mod reconcile;

pub use intake::{
    IntakeError, IntakeReceipt, IntakeResult, PullRequestEvent, PullRequestIntakeService,
};
pub use reconcile::{ReconcileError, ReconcileResult, ReconciliationService};
