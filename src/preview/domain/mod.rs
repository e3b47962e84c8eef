//! Domain model for preview environment reconciliation.
//!
//! Pull requests, their preview environments, pipeline runs and the event log
//! live here, free of storage and controller concerns.

mod action;
mod environment;
mod error;
mod event;
mod health;
mod ids;
mod naming;
mod pipeline;
mod pull_request;

pub use action::PrAction;
pub use environment::{
    ApplicationName, Environment, EnvironmentSpec, EnvironmentStatus, Namespace,
    PersistedEnvironmentData, ResourceHints,
};
pub use error::{ParseEnumError, PreviewDomainError};
pub use event::{Event, EventType, PersistedEventData};
pub use health::{ApplicationHealth, HealthVerdict};
pub use ids::{
    CommitSha, EnvironmentId, EventId, PipelineId, PullRequestId, PullRequestNumber,
    RepositoryFullName,
};
pub use naming::{FALLBACK_IMAGE_TAG, PreviewNames, PreviewNaming};
pub use pipeline::{Pipeline, PipelineStatus};
pub use pull_request::{
    PersistedPullRequestData, PullRequest, PullRequestDetails, PullRequestStatus,
};
