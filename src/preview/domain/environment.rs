//! Preview environment aggregate and its status machine.

use super::{EnvironmentId, ParseEnumError, PreviewDomainError, PullRequestId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a preview environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentStatus {
    /// The controller application was submitted and is converging.
    Provisioning,
    /// The controller reports the application healthy.
    Running,
    /// The application was observed healthy and later degraded.
    Degraded,
    /// Deployment did not converge to a healthy state.
    Failed,
    /// Teardown is in progress.
    Destroying,
    /// Teardown completed. The record is kept as history.
    Destroyed,
}

impl EnvironmentStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
            Self::Destroying => "destroying",
            Self::Destroyed => "destroyed",
        }
    }

    /// Returns whether a record in this status still counts as live.
    #[must_use]
    pub const fn is_live(self) -> bool {
        !matches!(self, Self::Destroyed)
    }

    /// Returns whether transition to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (
                Self::Provisioning | Self::Degraded,
                Self::Provisioning | Self::Running | Self::Failed | Self::Destroying
            ) | (
                Self::Running,
                Self::Provisioning | Self::Degraded | Self::Failed | Self::Destroying
            ) | (
                Self::Failed,
                Self::Provisioning | Self::Running | Self::Destroying
            ) | (Self::Destroying, Self::Destroyed)
        )
    }
}

impl fmt::Display for EnvironmentStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for EnvironmentStatus {
    type Error = ParseEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "provisioning" => Ok(Self::Provisioning),
            "running" => Ok(Self::Running),
            "degraded" => Ok(Self::Degraded),
            "failed" => Ok(Self::Failed),
            "destroying" => Ok(Self::Destroying),
            "destroyed" => Ok(Self::Destroyed),
            _ => Err(ParseEnumError::new("environment status", value)),
        }
    }
}

/// Kubernetes namespace hosting a preview environment.
///
/// Must be a DNS-1123 label: lowercase alphanumerics and `-`, starting and
/// ending with an alphanumeric, at most 63 characters.
///
/// # Examples
///
/// ```
/// use snapenv::preview::domain::Namespace;
///
/// assert!(Namespace::new("pr-42").is_ok());
/// assert!(Namespace::new("PR_42").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    const MAX_LENGTH: usize = 63;

    /// Creates a validated namespace.
    ///
    /// # Errors
    ///
    /// Returns [`PreviewDomainError::InvalidNamespace`] when the value is not a
    /// DNS-1123 label.
    pub fn new(value: impl Into<String>) -> Result<Self, PreviewDomainError> {
        let raw = value.into();
        let bytes = raw.as_bytes();
        let edge_ok = |byte: Option<&u8>| {
            byte.is_some_and(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        };
        let is_valid = !raw.is_empty()
            && raw.len() <= Self::MAX_LENGTH
            && raw
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
            && edge_ok(bytes.first())
            && edge_ok(bytes.last());
        if !is_valid {
            return Err(PreviewDomainError::InvalidNamespace(raw));
        }
        Ok(Self(raw))
    }

    /// Returns the namespace as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of the controller application backing an environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationName(String);

impl ApplicationName {
    const MAX_LENGTH: usize = 253;

    /// Creates a validated application name.
    ///
    /// # Errors
    ///
    /// Returns [`PreviewDomainError::InvalidApplicationName`] when the value is
    /// empty, too long, or contains characters other than lowercase
    /// alphanumerics, `-` and `.`.
    pub fn new(value: impl Into<String>) -> Result<Self, PreviewDomainError> {
        let raw = value.into();
        let is_valid = !raw.is_empty()
            && raw.len() <= Self::MAX_LENGTH
            && raw
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.');
        if !is_valid {
            return Err(PreviewDomainError::InvalidApplicationName(raw));
        }
        Ok(Self(raw))
    }

    /// Returns the application name as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Optional compute hints recorded with an environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHints {
    /// CPU request, for example `100m`.
    pub cpu_request: Option<String>,
    /// CPU limit.
    pub cpu_limit: Option<String>,
    /// Memory request, for example `128Mi`.
    pub memory_request: Option<String>,
    /// Memory limit.
    pub memory_limit: Option<String>,
}

impl ResourceHints {
    /// Returns whether no hint is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.cpu_request.is_none()
            && self.cpu_limit.is_none()
            && self.memory_request.is_none()
            && self.memory_limit.is_none()
    }
}

/// Input for provisioning a fresh environment record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSpec {
    /// Owning pull request.
    pub pull_request_id: PullRequestId,
    /// Target namespace.
    pub namespace: Namespace,
    /// Public preview URL.
    pub url: String,
    /// Controller application name.
    pub app_name: ApplicationName,
    /// Compute hints.
    pub resource_hints: ResourceHints,
}

/// Preview environment aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    id: EnvironmentId,
    pull_request_id: PullRequestId,
    namespace: Namespace,
    url: String,
    app_name: ApplicationName,
    status: EnvironmentStatus,
    resource_hints: ResourceHints,
    generation: u64,
    created_at: DateTime<Utc>,
    destroyed_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEnvironmentData {
    /// Persisted identifier.
    pub id: EnvironmentId,
    /// Persisted owning pull request.
    pub pull_request_id: PullRequestId,
    /// Persisted namespace.
    pub namespace: Namespace,
    /// Persisted URL.
    pub url: String,
    /// Persisted application name.
    pub app_name: ApplicationName,
    /// Persisted status.
    pub status: EnvironmentStatus,
    /// Persisted compute hints.
    pub resource_hints: ResourceHints,
    /// Persisted deploy generation.
    pub generation: u64,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted teardown timestamp.
    pub destroyed_at: Option<DateTime<Utc>>,
}

impl Environment {
    /// Creates a live environment in `provisioning` at generation 1.
    #[must_use]
    pub fn provision(spec: EnvironmentSpec, clock: &impl Clock) -> Self {
        Self {
            id: EnvironmentId::new(),
            pull_request_id: spec.pull_request_id,
            namespace: spec.namespace,
            url: spec.url,
            app_name: spec.app_name,
            status: EnvironmentStatus::Provisioning,
            resource_hints: spec.resource_hints,
            generation: 1,
            created_at: clock.utc(),
            destroyed_at: None,
        }
    }

    /// Reconstructs an environment from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedEnvironmentData) -> Self {
        Self {
            id: data.id,
            pull_request_id: data.pull_request_id,
            namespace: data.namespace,
            url: data.url,
            app_name: data.app_name,
            status: data.status,
            resource_hints: data.resource_hints,
            generation: data.generation,
            created_at: data.created_at,
            destroyed_at: data.destroyed_at,
        }
    }

    /// Returns the environment identifier.
    #[must_use]
    pub const fn id(&self) -> EnvironmentId {
        self.id
    }

    /// Returns the owning pull request identifier.
    #[must_use]
    pub const fn pull_request_id(&self) -> PullRequestId {
        self.pull_request_id
    }

    /// Returns the namespace.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Returns the preview URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the controller application name.
    #[must_use]
    pub const fn app_name(&self) -> &ApplicationName {
        &self.app_name
    }

    /// Returns the current status.
    #[must_use]
    pub const fn status(&self) -> EnvironmentStatus {
        self.status
    }

    /// Returns the compute hints.
    #[must_use]
    pub const fn resource_hints(&self) -> &ResourceHints {
        &self.resource_hints
    }

    /// Returns the deploy generation, bumped on every redeploy.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the teardown timestamp, if destroyed.
    #[must_use]
    pub const fn destroyed_at(&self) -> Option<DateTime<Utc>> {
        self.destroyed_at
    }

    /// Returns whether the record is live (not destroyed).
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.status.is_live()
    }

    /// Applies a status transition.
    ///
    /// Entering `destroyed` stamps `destroyed_at`.
    ///
    /// # Errors
    ///
    /// Returns [`PreviewDomainError::InvalidEnvironmentTransition`] when the
    /// status machine does not allow the move.
    pub fn transition_to(
        &mut self,
        target: EnvironmentStatus,
        clock: &impl Clock,
    ) -> Result<(), PreviewDomainError> {
        if !self.status.can_transition_to(target) {
            return Err(PreviewDomainError::InvalidEnvironmentTransition {
                environment_id: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        if target == EnvironmentStatus::Destroyed {
            self.destroyed_at = Some(clock.utc());
        }
        Ok(())
    }

    /// Records a status the store reported or a guarded write settled on.
    ///
    /// Unlike [`Self::transition_to`] this never stamps `destroyed_at`, so
    /// `destroyed` is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`PreviewDomainError::InvalidEnvironmentTransition`] when the
    /// status machine does not allow the move or the target is `destroyed`.
    pub fn settle_status(&mut self, target: EnvironmentStatus) -> Result<(), PreviewDomainError> {
        if target == EnvironmentStatus::Destroyed || !self.status.can_transition_to(target) {
            return Err(PreviewDomainError::InvalidEnvironmentTransition {
                environment_id: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    /// Restarts provisioning for a new deploy, refreshing the URL.
    ///
    /// # Errors
    ///
    /// Returns [`PreviewDomainError::InvalidEnvironmentTransition`] when the
    /// environment is being or has been torn down.
    pub fn redeploy(
        &mut self,
        url: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), PreviewDomainError> {
        self.transition_to(EnvironmentStatus::Provisioning, clock)?;
        self.url = url.into();
        self.generation = self.generation.saturating_add(1);
        Ok(())
    }

    /// Walks the environment through `destroying` into `destroyed`.
    ///
    /// # Errors
    ///
    /// Returns [`PreviewDomainError::InvalidEnvironmentTransition`] when the
    /// environment is already destroyed.
    pub fn tear_down(&mut self, clock: &impl Clock) -> Result<(), PreviewDomainError> {
        if self.status != EnvironmentStatus::Destroying {
            self.transition_to(EnvironmentStatus::Destroying, clock)?;
        }
        self.transition_to(EnvironmentStatus::Destroyed, clock)
    }
}
