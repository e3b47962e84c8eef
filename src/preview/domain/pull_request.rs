//! Tracked pull request aggregate.

use super::{
    CommitSha, ParseEnumError, PreviewDomainError, PullRequestId, PullRequestNumber,
    RepositoryFullName,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a tracked pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestStatus {
    /// Pull request is open.
    Open,
    /// Pull request was merged.
    Merged,
    /// Pull request was closed without merging.
    Closed,
}

impl PullRequestStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Merged => "merged",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for PullRequestStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for PullRequestStatus {
    type Error = ParseEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "merged" => Ok(Self::Merged),
            "closed" => Ok(Self::Closed),
            _ => Err(ParseEnumError::new("pull request status", value)),
        }
    }
}

/// Pull request metadata as reported by the source host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestDetails {
    /// Repository the pull request targets.
    pub repository: RepositoryFullName,
    /// Pull request number in the repository.
    pub number: PullRequestNumber,
    /// Pull request title.
    pub title: String,
    /// Login of the pull request author.
    pub author: String,
    /// Head branch name.
    pub head_branch: String,
    /// Base branch name.
    pub base_branch: String,
    /// Latest head commit, when known.
    pub commit_sha: Option<CommitSha>,
    /// Browser URL of the pull request.
    pub github_url: String,
}

impl PullRequestDetails {
    fn validate(&self) -> Result<(), PreviewDomainError> {
        if self.title.trim().is_empty() {
            return Err(PreviewDomainError::EmptyField("title"));
        }
        if self.author.trim().is_empty() {
            return Err(PreviewDomainError::EmptyField("author"));
        }
        if self.head_branch.trim().is_empty() {
            return Err(PreviewDomainError::EmptyField("head_branch"));
        }
        if self.base_branch.trim().is_empty() {
            return Err(PreviewDomainError::EmptyField("base_branch"));
        }
        Ok(())
    }
}

/// Pull request aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    id: PullRequestId,
    details: PullRequestDetails,
    status: PullRequestStatus,
    preview_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedPullRequestData {
    /// Persisted identifier.
    pub id: PullRequestId,
    /// Persisted source metadata.
    pub details: PullRequestDetails,
    /// Persisted lifecycle status.
    pub status: PullRequestStatus,
    /// Persisted preview URL, if any.
    pub preview_url: Option<String>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl PullRequest {
    /// Starts tracking a newly observed pull request in the `open` status.
    ///
    /// # Errors
    ///
    /// Returns [`PreviewDomainError::EmptyField`] when a required text field
    /// is blank.
    pub fn track(details: PullRequestDetails, clock: &impl Clock) -> Result<Self, PreviewDomainError> {
        details.validate()?;
        let timestamp = clock.utc();
        Ok(Self {
            id: PullRequestId::new(),
            details,
            status: PullRequestStatus::Open,
            preview_url: None,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Reconstructs a pull request from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedPullRequestData) -> Self {
        Self {
            id: data.id,
            details: data.details,
            status: data.status,
            preview_url: data.preview_url,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the pull request identifier.
    #[must_use]
    pub const fn id(&self) -> PullRequestId {
        self.id
    }

    /// Returns the source metadata.
    #[must_use]
    pub const fn details(&self) -> &PullRequestDetails {
        &self.details
    }

    /// Returns the repository.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryFullName {
        &self.details.repository
    }

    /// Returns the pull request number.
    #[must_use]
    pub const fn number(&self) -> PullRequestNumber {
        self.details.number
    }

    /// Returns the latest known head commit.
    #[must_use]
    pub const fn commit_sha(&self) -> Option<&CommitSha> {
        self.details.commit_sha.as_ref()
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> PullRequestStatus {
        self.status
    }

    /// Returns the preview URL, if an environment is live.
    #[must_use]
    pub fn preview_url(&self) -> Option<&str> {
        self.preview_url.as_deref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Refreshes title and head commit from a newer observation.
    ///
    /// A missing commit SHA keeps the previously recorded one.
    ///
    /// # Errors
    ///
    /// Returns [`PreviewDomainError::EmptyField`] when the title is blank.
    pub fn refresh(
        &mut self,
        title: impl Into<String>,
        commit_sha: Option<CommitSha>,
        clock: &impl Clock,
    ) -> Result<(), PreviewDomainError> {
        let new_title = title.into();
        if new_title.trim().is_empty() {
            return Err(PreviewDomainError::EmptyField("title"));
        }
        self.details.title = new_title;
        if commit_sha.is_some() {
            self.details.commit_sha = commit_sha;
        }
        self.touch(clock);
        Ok(())
    }

    /// Records that the pull request was closed, merged or not.
    pub fn close(&mut self, merged: bool, clock: &impl Clock) {
        self.status = if merged {
            PullRequestStatus::Merged
        } else {
            PullRequestStatus::Closed
        };
        self.touch(clock);
    }

    /// Records that the pull request was reopened.
    pub fn reopen(&mut self, clock: &impl Clock) {
        self.status = PullRequestStatus::Open;
        self.touch(clock);
    }

    /// Sets or clears the preview URL.
    pub fn set_preview_url(&mut self, url: Option<String>, clock: &impl Clock) {
        self.preview_url = url;
        self.touch(clock);
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}
