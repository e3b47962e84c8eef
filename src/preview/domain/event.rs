//! Append-only event log entries streamed to the dashboard.

use super::{EventId, ParseEnumError, PipelineId, PullRequestId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of an event log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A pull request was opened.
    PrOpened,
    /// A pull request received new commits or metadata.
    PrUpdated,
    /// A pull request was closed without merging.
    PrClosed,
    /// A pull request was merged.
    PrMerged,
    /// A pull request was reopened.
    PrReopened,
    /// A pipeline run started.
    PipelineStarted,
    /// A pipeline stage started.
    StageStarted,
    /// A pipeline stage completed.
    StageCompleted,
    /// A pipeline stage failed.
    StageFailed,
    /// A deployment was submitted to the controller.
    DeployStarted,
    /// An environment entered provisioning.
    EnvProvisioning,
    /// An environment became healthy.
    EnvReady,
    /// An environment teardown started.
    EnvDestroying,
    /// An environment was torn down.
    EnvDestroyed,
    /// An environment failed to converge.
    EnvFailed,
}

impl EventType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PrOpened => "pr_opened",
            Self::PrUpdated => "pr_updated",
            Self::PrClosed => "pr_closed",
            Self::PrMerged => "pr_merged",
            Self::PrReopened => "pr_reopened",
            Self::PipelineStarted => "pipeline_started",
            Self::StageStarted => "stage_started",
            Self::StageCompleted => "stage_completed",
            Self::StageFailed => "stage_failed",
            Self::DeployStarted => "deploy_started",
            Self::EnvProvisioning => "env_provisioning",
            Self::EnvReady => "env_ready",
            Self::EnvDestroying => "env_destroying",
            Self::EnvDestroyed => "env_destroyed",
            Self::EnvFailed => "env_failed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for EventType {
    type Error = ParseEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let parsed = match value.trim().to_ascii_lowercase().as_str() {
            "pr_opened" => Self::PrOpened,
            "pr_updated" => Self::PrUpdated,
            "pr_closed" => Self::PrClosed,
            "pr_merged" => Self::PrMerged,
            "pr_reopened" => Self::PrReopened,
            "pipeline_started" => Self::PipelineStarted,
            "stage_started" => Self::StageStarted,
            "stage_completed" => Self::StageCompleted,
            "stage_failed" => Self::StageFailed,
            "deploy_started" => Self::DeployStarted,
            "env_provisioning" => Self::EnvProvisioning,
            "env_ready" => Self::EnvReady,
            "env_destroying" => Self::EnvDestroying,
            "env_destroyed" => Self::EnvDestroyed,
            "env_failed" => Self::EnvFailed,
            _ => return Err(ParseEnumError::new("event type", value)),
        };
        Ok(parsed)
    }
}

/// Event log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    event_type: EventType,
    message: String,
    metadata: Option<serde_json::Value>,
    pull_request_id: Option<PullRequestId>,
    pipeline_id: Option<PipelineId>,
    created_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted event.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedEventData {
    /// Persisted identifier.
    pub id: EventId,
    /// Persisted type.
    pub event_type: EventType,
    /// Persisted message.
    pub message: String,
    /// Persisted metadata.
    pub metadata: Option<serde_json::Value>,
    /// Persisted pull request link.
    pub pull_request_id: Option<PullRequestId>,
    /// Persisted pipeline link.
    pub pipeline_id: Option<PipelineId>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(event_type: EventType, message: impl Into<String>, clock: &impl Clock) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            message: message.into(),
            metadata: None,
            pull_request_id: None,
            pipeline_id: None,
            created_at: clock.utc(),
        }
    }

    /// Links the event to a pull request.
    #[must_use]
    pub const fn for_pull_request(mut self, pull_request_id: PullRequestId) -> Self {
        self.pull_request_id = Some(pull_request_id);
        self
    }

    /// Links the event to a pipeline run.
    #[must_use]
    pub const fn for_pipeline(mut self, pipeline_id: PipelineId) -> Self {
        self.pipeline_id = Some(pipeline_id);
        self
    }

    /// Attaches structured metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Reconstructs an event from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedEventData) -> Self {
        Self {
            id: data.id,
            event_type: data.event_type,
            message: data.message,
            metadata: data.metadata,
            pull_request_id: data.pull_request_id,
            pipeline_id: data.pipeline_id,
            created_at: data.created_at,
        }
    }

    /// Returns the event identifier.
    #[must_use]
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// Returns the event type.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the structured metadata, if any.
    #[must_use]
    pub const fn metadata(&self) -> Option<&serde_json::Value> {
        self.metadata.as_ref()
    }

    /// Returns the linked pull request, if any.
    #[must_use]
    pub const fn pull_request_id(&self) -> Option<PullRequestId> {
        self.pull_request_id
    }

    /// Returns the linked pipeline, if any.
    #[must_use]
    pub const fn pipeline_id(&self) -> Option<PipelineId> {
        self.pipeline_id
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
