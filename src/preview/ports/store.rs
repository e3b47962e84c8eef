//! Store port for pull requests, environments, pipelines and events.

use crate::preview::domain::{
    ApplicationName, Environment, EnvironmentId, EnvironmentStatus, Event, Namespace, Pipeline,
    PullRequest, PullRequestId, PullRequestNumber, RepositoryFullName,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Whether a record in a [`ChangeSet`] is new or replaces a stored one.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordWrite<T> {
    /// The record does not exist yet.
    Insert(T),
    /// The record exists and is replaced wholesale.
    Update(T),
}

impl<T> RecordWrite<T> {
    /// Returns the record being written.
    #[must_use]
    pub const fn record(&self) -> &T {
        match self {
            Self::Insert(record) | Self::Update(record) => record,
        }
    }
}

/// A status change guarded by the environment state it was derived from.
///
/// Only the status column is written, and only while the stored record still
/// has the expected generation and status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentStatusWrite {
    /// Environment to update.
    pub id: EnvironmentId,
    /// Generation observed when the change was derived.
    pub expected_generation: u64,
    /// Status observed when the change was derived.
    pub expected_status: EnvironmentStatus,
    /// Status to store.
    pub status: EnvironmentStatus,
}

impl EnvironmentStatusWrite {
    /// Builds a guarded move of `environment` to `status`.
    #[must_use]
    pub const fn from_observed(environment: &Environment, status: EnvironmentStatus) -> Self {
        Self {
            id: environment.id(),
            expected_generation: environment.generation(),
            expected_status: environment.status(),
            status,
        }
    }
}

/// Writes committed together in one store transaction.
///
/// Apply order is pull requests, pipelines, environments, guarded status
/// changes, then events, so events may reference rows created in the same set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pull_requests: Vec<RecordWrite<PullRequest>>,
    pipelines: Vec<Pipeline>,
    environments: Vec<RecordWrite<Environment>>,
    environment_statuses: Vec<EnvironmentStatusWrite>,
    events: Vec<Event>,
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new pull request.
    #[must_use]
    pub fn insert_pull_request(mut self, pull_request: PullRequest) -> Self {
        self.pull_requests.push(RecordWrite::Insert(pull_request));
        self
    }

    /// Replaces a stored pull request.
    #[must_use]
    pub fn update_pull_request(mut self, pull_request: PullRequest) -> Self {
        self.pull_requests.push(RecordWrite::Update(pull_request));
        self
    }

    /// Adds a new pipeline run.
    #[must_use]
    pub fn insert_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    /// Adds a new environment.
    #[must_use]
    pub fn insert_environment(mut self, environment: Environment) -> Self {
        self.environments.push(RecordWrite::Insert(environment));
        self
    }

    /// Replaces a stored environment.
    #[must_use]
    pub fn update_environment(mut self, environment: Environment) -> Self {
        self.environments.push(RecordWrite::Update(environment));
        self
    }

    /// Changes an environment's status if it is unchanged since it was read.
    #[must_use]
    pub fn set_environment_status(mut self, write: EnvironmentStatusWrite) -> Self {
        self.environment_statuses.push(write);
        self
    }

    /// Appends an event.
    #[must_use]
    pub fn append_event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    /// Returns pull request writes.
    #[must_use]
    pub fn pull_requests(&self) -> &[RecordWrite<PullRequest>] {
        &self.pull_requests
    }

    /// Returns pipeline inserts.
    #[must_use]
    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    /// Returns environment writes.
    #[must_use]
    pub fn environments(&self) -> &[RecordWrite<Environment>] {
        &self.environments
    }

    /// Returns guarded environment status changes.
    #[must_use]
    pub fn environment_statuses(&self) -> &[EnvironmentStatusWrite] {
        &self.environment_statuses
    }

    /// Returns appended events.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Returns whether the set holds no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pull_requests.is_empty()
            && self.pipelines.is_empty()
            && self.environments.is_empty()
            && self.environment_statuses.is_empty()
            && self.events.is_empty()
    }
}

/// Persistence contract for the reconciliation workflows.
///
/// Every read reflects the latest committed state; [`PreviewStore::apply`] is
/// the only write path and is all-or-nothing.
#[async_trait]
pub trait PreviewStore: Send + Sync {
    /// Finds a pull request by identifier.
    async fn find_pull_request(&self, id: PullRequestId) -> StoreResult<Option<PullRequest>>;

    /// Finds a pull request by repository and number.
    async fn find_pull_request_by_number(
        &self,
        repository: &RepositoryFullName,
        number: PullRequestNumber,
    ) -> StoreResult<Option<PullRequest>>;

    /// Finds the non-destroyed environment of a pull request.
    async fn find_live_environment(
        &self,
        pull_request_id: PullRequestId,
    ) -> StoreResult<Option<Environment>>;

    /// Finds the non-destroyed environment backed by a controller application.
    async fn find_live_environment_by_app_name(
        &self,
        app_name: &ApplicationName,
    ) -> StoreResult<Option<Environment>>;

    /// Returns every environment record of a pull request, oldest first.
    async fn list_environments(&self, pull_request_id: PullRequestId)
    -> StoreResult<Vec<Environment>>;

    /// Returns the events linked to a pull request, oldest first.
    async fn list_events(&self, pull_request_id: PullRequestId) -> StoreResult<Vec<Event>>;

    /// Commits a change set atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateEnvironment`] when an insert would give
    /// a pull request a second live environment,
    /// [`StoreError::DuplicateNamespace`] when a live namespace is taken,
    /// [`StoreError::DuplicatePullRequest`] for a repeated repository and
    /// number, [`StoreError::NotFound`] when an update targets a missing
    /// record, or [`StoreError::StaleEnvironment`] when a guarded status
    /// change no longer matches the stored record. Nothing is written when an
    /// error is returned.
    async fn apply(&self, changes: ChangeSet) -> StoreResult<()>;
}

/// Errors returned by store implementations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The pull request already has a live environment.
    #[error("pull request {0} already has a live environment")]
    DuplicateEnvironment(PullRequestId),

    /// A live environment already uses the namespace.
    #[error("namespace {0} is already used by a live environment")]
    DuplicateNamespace(Namespace),

    /// The repository and number are already tracked.
    #[error("pull request {repository}#{number} is already tracked")]
    DuplicatePullRequest {
        /// Repository name.
        repository: RepositoryFullName,
        /// Pull request number.
        number: PullRequestNumber,
    },

    /// A record targeted by an update does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind.
        kind: &'static str,
        /// Record identifier.
        id: Uuid,
    },

    /// A guarded status change found the environment modified since it was
    /// read.
    #[error(
        "environment {id} changed since it was read (expected generation {expected_generation}, found {current_generation})"
    )]
    StaleEnvironment {
        /// Environment identifier.
        id: EnvironmentId,
        /// Generation the change was derived from.
        expected_generation: u64,
        /// Generation currently stored.
        current_generation: u64,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Returns whether repeating the operation against fresh reads may
    /// succeed.
    ///
    /// A racing insert of a live environment is transient: the retry finds
    /// the winner's record and updates it. Namespace and pull request
    /// conflicts, and updates of missing records, repeat identically.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_) | Self::StaleEnvironment { .. } | Self::DuplicateEnvironment(_)
        )
    }

    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
