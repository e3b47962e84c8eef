//! In-memory preview store for tests and single-process use.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::preview::{
    domain::{
        ApplicationName, Environment, Event, Pipeline, PipelineId, PullRequest, PullRequestId,
        PullRequestNumber, RepositoryFullName,
    },
    ports::{
        ChangeSet, EnvironmentStatusWrite, PreviewStore, RecordWrite, StoreError, StoreResult,
    },
};

/// Thread-safe in-memory preview store.
///
/// [`PreviewStore::apply`] stages the change set on a copy of the state and
/// swaps it in only when every write succeeds.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPreviewStore {
    state: Arc<RwLock<InMemoryPreviewState>>,
    fail_next_event_append: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Default)]
struct InMemoryPreviewState {
    pull_requests: HashMap<PullRequestId, PullRequest>,
    pipelines: HashMap<PipelineId, Pipeline>,
    environments: Vec<Environment>,
    events: Vec<Event>,
}

impl InMemoryPreviewStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next change set that appends an event fail as a
    /// persistence error.
    pub fn fail_next_event_append(&self) {
        self.fail_next_event_append.store(true, Ordering::SeqCst);
    }

    /// Returns every stored event in commit order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the state lock is poisoned.
    pub fn all_events(&self) -> StoreResult<Vec<Event>> {
        Ok(self.read()?.events.clone())
    }

    /// Returns every stored pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the state lock is poisoned.
    pub fn all_pipelines(&self) -> StoreResult<Vec<Pipeline>> {
        Ok(self.read()?.pipelines.values().cloned().collect())
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, InMemoryPreviewState>> {
        self.state
            .read()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))
    }
}

impl InMemoryPreviewState {
    fn write_pull_request(&mut self, write: &RecordWrite<PullRequest>) -> StoreResult<()> {
        match write {
            RecordWrite::Insert(pull_request) => {
                let duplicate = self.pull_requests.values().any(|existing| {
                    existing.repository() == pull_request.repository()
                        && existing.number() == pull_request.number()
                });
                if duplicate || self.pull_requests.contains_key(&pull_request.id()) {
                    return Err(StoreError::DuplicatePullRequest {
                        repository: pull_request.repository().clone(),
                        number: pull_request.number(),
                    });
                }
                self.pull_requests
                    .insert(pull_request.id(), pull_request.clone());
            }
            RecordWrite::Update(pull_request) => {
                let slot = self.pull_requests.get_mut(&pull_request.id()).ok_or(
                    StoreError::NotFound {
                        kind: "pull request",
                        id: pull_request.id().into_inner(),
                    },
                )?;
                *slot = pull_request.clone();
            }
        }
        Ok(())
    }

    fn insert_pipeline(&mut self, pipeline: &Pipeline) -> StoreResult<()> {
        if !self.pull_requests.contains_key(&pipeline.pull_request_id()) {
            return Err(StoreError::NotFound {
                kind: "pull request",
                id: pipeline.pull_request_id().into_inner(),
            });
        }
        self.pipelines.insert(pipeline.id(), pipeline.clone());
        Ok(())
    }

    fn write_environment(&mut self, write: &RecordWrite<Environment>) -> StoreResult<()> {
        let environment = write.record();
        if environment.is_live() {
            self.check_live_uniqueness(environment)?;
        }
        match write {
            RecordWrite::Insert(_) => {
                if !self
                    .pull_requests
                    .contains_key(&environment.pull_request_id())
                {
                    return Err(StoreError::NotFound {
                        kind: "pull request",
                        id: environment.pull_request_id().into_inner(),
                    });
                }
                self.environments.push(environment.clone());
            }
            RecordWrite::Update(_) => {
                let slot = self
                    .environments
                    .iter_mut()
                    .find(|existing| existing.id() == environment.id())
                    .ok_or(StoreError::NotFound {
                        kind: "environment",
                        id: environment.id().into_inner(),
                    })?;
                *slot = environment.clone();
            }
        }
        Ok(())
    }

    fn set_environment_status(&mut self, write: &EnvironmentStatusWrite) -> StoreResult<()> {
        let slot = self
            .environments
            .iter_mut()
            .find(|existing| existing.id() == write.id)
            .ok_or(StoreError::NotFound {
                kind: "environment",
                id: write.id.into_inner(),
            })?;
        if slot.generation() != write.expected_generation || slot.status() != write.expected_status
        {
            return Err(StoreError::StaleEnvironment {
                id: write.id,
                expected_generation: write.expected_generation,
                current_generation: slot.generation(),
            });
        }
        slot.settle_status(write.status).map_err(StoreError::persistence)?;
        Ok(())
    }

    fn check_live_uniqueness(&self, environment: &Environment) -> StoreResult<()> {
        let others = self
            .environments
            .iter()
            .filter(|existing| existing.id() != environment.id() && existing.is_live());
        for existing in others {
            if existing.pull_request_id() == environment.pull_request_id() {
                return Err(StoreError::DuplicateEnvironment(
                    environment.pull_request_id(),
                ));
            }
            if existing.namespace() == environment.namespace() {
                return Err(StoreError::DuplicateNamespace(
                    environment.namespace().clone(),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PreviewStore for InMemoryPreviewStore {
    async fn find_pull_request(&self, id: PullRequestId) -> StoreResult<Option<PullRequest>> {
        Ok(self.read()?.pull_requests.get(&id).cloned())
    }

    async fn find_pull_request_by_number(
        &self,
        repository: &RepositoryFullName,
        number: PullRequestNumber,
    ) -> StoreResult<Option<PullRequest>> {
        let state = self.read()?;
        let found = state
            .pull_requests
            .values()
            .find(|pr| pr.repository() == repository && pr.number() == number)
            .cloned();
        Ok(found)
    }

    async fn find_live_environment(
        &self,
        pull_request_id: PullRequestId,
    ) -> StoreResult<Option<Environment>> {
        let state = self.read()?;
        let found = state
            .environments
            .iter()
            .find(|env| env.pull_request_id() == pull_request_id && env.is_live())
            .cloned();
        Ok(found)
    }

    async fn find_live_environment_by_app_name(
        &self,
        app_name: &ApplicationName,
    ) -> StoreResult<Option<Environment>> {
        let state = self.read()?;
        let found = state
            .environments
            .iter()
            .find(|env| env.app_name() == app_name && env.is_live())
            .cloned();
        Ok(found)
    }

    async fn list_environments(
        &self,
        pull_request_id: PullRequestId,
    ) -> StoreResult<Vec<Environment>> {
        let state = self.read()?;
        Ok(state
            .environments
            .iter()
            .filter(|env| env.pull_request_id() == pull_request_id)
            .cloned()
            .collect())
    }

    async fn list_events(&self, pull_request_id: PullRequestId) -> StoreResult<Vec<Event>> {
        let state = self.read()?;
        Ok(state
            .events
            .iter()
            .filter(|event| event.pull_request_id() == Some(pull_request_id))
            .cloned()
            .collect())
    }

    async fn apply(&self, changes: ChangeSet) -> StoreResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))?;
        let mut staged = state.clone();

        for write in changes.pull_requests() {
            staged.write_pull_request(write)?;
        }
        for pipeline in changes.pipelines() {
            staged.insert_pipeline(pipeline)?;
        }
        for write in changes.environments() {
            staged.write_environment(write)?;
        }
        for write in changes.environment_statuses() {
            staged.set_environment_status(write)?;
        }
        if !changes.events().is_empty()
            && self.fail_next_event_append.swap(false, Ordering::SeqCst)
        {
            return Err(StoreError::persistence(std::io::Error::other(
                "injected event append failure",
            )));
        }
        staged.events.extend(changes.events().iter().cloned());

        *state = staged;
        Ok(())
    }
}
