//! Port contracts for preview reconciliation.
//!
//! Ports define infrastructure-agnostic interfaces used by preview services.

pub mod controller;
pub mod events;
pub mod store;

pub use controller::{
    ApplicationRequest, ControllerError, ControllerResponse, ControllerResult,
    DeploymentController,
};
pub use events::{EventSink, EventSinkError};
pub use store::{
    ChangeSet, EnvironmentStatusWrite, PreviewStore, RecordWrite, StoreError, StoreResult,
};
