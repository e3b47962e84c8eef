//! Error types for preview domain validation and parsing.

use super::{EnvironmentId, EnvironmentStatus};
use thiserror::Error;

/// Errors returned while constructing or mutating preview domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreviewDomainError {
    /// The repository name does not follow `owner/repo` format.
    #[error("invalid repository name '{0}', expected owner/repo")]
    InvalidRepository(String),

    /// The pull request number is zero or exceeds the schema limit.
    #[error("invalid pull request number {0}, expected a positive integer")]
    InvalidPullRequestNumber(u64),

    /// The commit SHA is empty or contains non-hexadecimal characters.
    #[error("invalid commit SHA '{0}'")]
    InvalidCommitSha(String),

    /// The namespace is not a valid DNS-1123 label.
    #[error("invalid namespace '{0}': expected lowercase alphanumerics and '-', at most 63 characters")]
    InvalidNamespace(String),

    /// The controller application name is empty or too long.
    #[error("invalid application name '{0}'")]
    InvalidApplicationName(String),

    /// A required text field is empty after trimming.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// The environment status machine rejected a transition.
    #[error("invalid environment transition for {environment_id}: {from} -> {to}")]
    InvalidEnvironmentTransition {
        /// Environment being mutated.
        environment_id: EnvironmentId,
        /// Current status.
        from: EnvironmentStatus,
        /// Requested status.
        to: EnvironmentStatus,
    },
}

/// Error returned while parsing a persisted enumeration value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    /// Name of the enumeration being parsed.
    pub kind: &'static str,
    /// Rejected raw value.
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}
