//! Identifier and validated scalar types for the preview domain.

use super::PreviewDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the wrapped UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_identifier!(
    /// Unique identifier for a tracked pull request record.
    PullRequestId
);

uuid_identifier!(
    /// Unique identifier for a preview environment record.
    EnvironmentId
);

uuid_identifier!(
    /// Unique identifier for a pipeline run record.
    PipelineId
);

uuid_identifier!(
    /// Unique identifier for an event log entry.
    EventId
);

/// Positive pull request number from GitHub.
///
/// Must be representable by `PostgreSQL` `BIGINT` (`<= i64::MAX`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PullRequestNumber(u64);

impl PullRequestNumber {
    /// Largest pull request number representable in the current schema.
    const MAX_PERSISTED_VALUE: u64 = i64::MAX as u64;

    /// Creates a validated pull request number.
    ///
    /// # Errors
    ///
    /// Returns [`PreviewDomainError::InvalidPullRequestNumber`] when the value
    /// is zero or exceeds `i64::MAX`.
    pub const fn new(value: u64) -> Result<Self, PreviewDomainError> {
        if value == 0 || value > Self::MAX_PERSISTED_VALUE {
            return Err(PreviewDomainError::InvalidPullRequestNumber(value));
        }
        Ok(Self(value))
    }

    /// Returns the underlying numeric value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PullRequestNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized repository identifier in `owner/repo` format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryFullName(String);

impl RepositoryFullName {
    /// Creates a validated repository name.
    ///
    /// # Errors
    ///
    /// Returns [`PreviewDomainError::InvalidRepository`] if the value does not
    /// contain exactly one slash-delimited owner and repository segment.
    pub fn new(value: impl Into<String>) -> Result<Self, PreviewDomainError> {
        let raw = value.into();
        let normalized = raw.trim();
        let mut segments = normalized.split('/');
        let owner = segments.next().unwrap_or_default();
        let repo = segments.next().unwrap_or_default();
        let is_valid = !owner.is_empty()
            && !repo.is_empty()
            && segments.next().is_none()
            && !normalized.chars().any(char::is_whitespace);

        if !is_valid {
            return Err(PreviewDomainError::InvalidRepository(raw));
        }

        Ok(Self(normalized.to_owned()))
    }

    /// Returns the repository name as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RepositoryFullName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for RepositoryFullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git commit SHA, abbreviated or full (7 to 40 hexadecimal characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitSha(String);

impl CommitSha {
    const MIN_LENGTH: usize = 7;
    const MAX_LENGTH: usize = 40;
    const SHORT_LENGTH: usize = 7;

    /// Creates a validated commit SHA, normalized to lowercase.
    ///
    /// # Errors
    ///
    /// Returns [`PreviewDomainError::InvalidCommitSha`] when the value is not
    /// 7 to 40 hexadecimal characters.
    pub fn new(value: impl Into<String>) -> Result<Self, PreviewDomainError> {
        let raw = value.into();
        let normalized = raw.trim().to_ascii_lowercase();
        let is_valid = (Self::MIN_LENGTH..=Self::MAX_LENGTH).contains(&normalized.len())
            && normalized.chars().all(|ch| ch.is_ascii_hexdigit());
        if !is_valid {
            return Err(PreviewDomainError::InvalidCommitSha(raw));
        }
        Ok(Self(normalized))
    }

    /// Returns the full SHA as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the seven-character abbreviation used as an image tag.
    #[must_use]
    pub fn short(&self) -> String {
        self.0.chars().take(Self::SHORT_LENGTH).collect()
    }
}

impl fmt::Display for CommitSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
