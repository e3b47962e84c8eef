//! Pipeline run records created for deploy-triggering pull request events.

use super::{CommitSha, ParseEnumError, PipelineId, PullRequestId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Queued, not started.
    Pending,
    /// In progress.
    Running,
    /// Finished successfully.
    Success,
    /// Finished with a failure.
    Failed,
    /// Superseded or aborted.
    Cancelled,
}

impl PipelineStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for PipelineStatus {
    type Error = ParseEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseEnumError::new("pipeline status", value)),
        }
    }
}

/// Pipeline run record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    id: PipelineId,
    pull_request_id: PullRequestId,
    commit_sha: Option<CommitSha>,
    status: PipelineStatus,
    created_at: DateTime<Utc>,
}

impl Pipeline {
    /// Creates a pending pipeline for the given commit.
    #[must_use]
    pub fn pending(
        pull_request_id: PullRequestId,
        commit_sha: Option<CommitSha>,
        clock: &impl Clock,
    ) -> Self {
        Self {
            id: PipelineId::new(),
            pull_request_id,
            commit_sha,
            status: PipelineStatus::Pending,
            created_at: clock.utc(),
        }
    }

    /// Reconstructs a pipeline from persisted fields.
    #[must_use]
    pub const fn from_persisted(
        id: PipelineId,
        pull_request_id: PullRequestId,
        commit_sha: Option<CommitSha>,
        status: PipelineStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            pull_request_id,
            commit_sha,
            status,
            created_at,
        }
    }

    /// Returns the pipeline identifier.
    #[must_use]
    pub const fn id(&self) -> PipelineId {
        self.id
    }

    /// Returns the owning pull request.
    #[must_use]
    pub const fn pull_request_id(&self) -> PullRequestId {
        self.pull_request_id
    }

    /// Returns the commit under test.
    #[must_use]
    pub const fn commit_sha(&self) -> Option<&CommitSha> {
        self.commit_sha.as_ref()
    }

    /// Returns the run status.
    #[must_use]
    pub const fn status(&self) -> PipelineStatus {
        self.status
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
