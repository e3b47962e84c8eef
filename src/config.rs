//! Runtime configuration for the reconciliation worker.
//!
//! Settings are plain values with defaults; the worker binary fills them from
//! command-line flags and environment variables.

use crate::dispatch::RetryPolicies;
use crate::preview::domain::{
    ApplicationName, PreviewDomainError, PreviewNaming, RepositoryFullName, ResourceHints,
};
use std::time::Duration;
use thiserror::Error;

/// Default public domain previews are served under.
pub const DEFAULT_PREVIEW_DOMAIN: &str = "preview.localhost";
/// Default chart path inside the previewed repository.
pub const DEFAULT_HELM_CHART_PATH: &str = "infra/helm/snapenv";
/// Default controller API endpoint.
pub const DEFAULT_CONTROLLER_SERVER: &str = "https://localhost:8080";
/// Default prefix of controller application names.
pub const DEFAULT_APP_PREFIX: &str = "snapenv";

/// Top-level worker configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapEnvConfig {
    /// Preview naming and chart settings.
    pub preview: PreviewSettings,
    /// Controller connection settings.
    pub controller: ControllerSettings,
    /// Task dispatch settings.
    pub dispatch: DispatchSettings,
    /// Reconciliation policy switches.
    pub reconcile: ReconcileSettings,
}

impl SnapEnvConfig {
    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preview.preview_domain.trim().is_empty() {
            return Err(ConfigError::Empty("preview domain"));
        }
        if self.preview.helm_chart_path.trim().is_empty() {
            return Err(ConfigError::Empty("helm chart path"));
        }
        if self.controller.server.trim().is_empty() {
            return Err(ConfigError::Empty("controller server"));
        }
        if self.dispatch.worker_slots == 0 {
            return Err(ConfigError::NoWorkerSlots);
        }
        let policies = &self.dispatch.retry;
        for policy in [
            policies.dispatch,
            policies.deploy,
            policies.destroy,
            policies.poll,
        ] {
            if policy.max_attempts == 0 {
                return Err(ConfigError::ZeroAttempts);
            }
        }
        ApplicationName::new(format!("{}-pr-1", self.preview.app_prefix))?;
        Ok(())
    }
}

/// Preview naming and chart settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSettings {
    /// Domain preview hosts are created under.
    pub preview_domain: String,
    /// Repository to deploy instead of each pull request's own.
    pub repository: Option<RepositoryFullName>,
    /// Chart path inside the repository.
    pub helm_chart_path: String,
    /// Prefix of controller application names.
    pub app_prefix: String,
    /// Compute hints recorded on new environments.
    pub resource_hints: ResourceHints,
}

impl PreviewSettings {
    /// Returns the naming scheme these settings describe.
    #[must_use]
    pub fn naming(&self) -> PreviewNaming {
        PreviewNaming::new(self.app_prefix.clone(), self.preview_domain.clone())
    }
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            preview_domain: DEFAULT_PREVIEW_DOMAIN.to_owned(),
            repository: None,
            helm_chart_path: DEFAULT_HELM_CHART_PATH.to_owned(),
            app_prefix: DEFAULT_APP_PREFIX.to_owned(),
            resource_hints: ResourceHints::default(),
        }
    }
}

/// Controller connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// API base URL.
    pub server: String,
    /// Bearer token.
    pub token: String,
    /// Skip TLS certificate verification.
    pub insecure_tls: bool,
    /// Timeout for create, update and delete calls.
    pub mutate_timeout: Duration,
    /// Timeout for status calls.
    pub status_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            server: DEFAULT_CONTROLLER_SERVER.to_owned(),
            token: String::new(),
            insecure_tls: false,
            mutate_timeout: Duration::from_secs(30),
            status_timeout: Duration::from_secs(15),
        }
    }
}

/// Task dispatch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Concurrent worker slots.
    pub worker_slots: usize,
    /// Sleep between polls of an empty queue.
    pub idle_interval: Duration,
    /// How long a reserved task stays hidden before redelivery.
    pub lease_timeout: Duration,
    /// Per-kind retry policies.
    pub retry: RetryPolicies,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            worker_slots: 4,
            idle_interval: Duration::from_millis(500),
            lease_timeout: Duration::from_secs(300),
            retry: RetryPolicies::default(),
        }
    }
}

/// How an `Unknown` health observation is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum UnknownHealthPolicy {
    /// Collapse into failure.
    #[default]
    Fail,
    /// Keep polling.
    Retry,
}

/// How a poll for an outdated deploy generation is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StalePollPolicy {
    /// Apply the observation to the live environment regardless.
    #[default]
    Apply,
    /// Stop without writing.
    Discard,
}

/// Reconciliation policy switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Treatment of `Unknown` health.
    pub unknown_health: UnknownHealthPolicy,
    /// Treatment of polls for a superseded deploy.
    pub stale_poll: StalePollPolicy,
}

/// Configuration validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting is blank.
    #[error("{0} must not be empty")]
    Empty(&'static str),
    /// No worker slots configured.
    #[error("worker slots must be at least 1")]
    NoWorkerSlots,
    /// A retry policy allows no executions.
    #[error("retry policies must allow at least one attempt")]
    ZeroAttempts,
    /// The naming settings produce invalid resource names.
    #[error("invalid preview naming: {0}")]
    Naming(#[from] PreviewDomainError),
}
