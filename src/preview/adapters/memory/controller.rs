//! Scripted in-memory deployment controller.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::preview::{
    domain::{ApplicationHealth, ApplicationName},
    ports::{
        ApplicationRequest, ControllerError, ControllerResponse, ControllerResult,
        DeploymentController,
    },
};

/// A call observed by [`ScriptedDeploymentController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerCall {
    /// `upsert_application` with the given request.
    Upsert(ApplicationRequest),
    /// `delete_application` for the given application.
    Delete(ApplicationName),
    /// `application_health` for the given application.
    Health(ApplicationName),
}

/// Deployment controller that replays a scripted health sequence.
///
/// Health observations are served front to back; once the script is
/// exhausted the last value repeats. An empty script reports `Progressing`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDeploymentController {
    state: Arc<Mutex<ScriptState>>,
}

#[derive(Debug, Default)]
struct ScriptState {
    health: VecDeque<ApplicationHealth>,
    last_health: Option<ApplicationHealth>,
    failing_upserts: usize,
    failing_deletes: usize,
    applications: HashSet<ApplicationName>,
    calls: Vec<ControllerCall>,
}

impl ScriptedDeploymentController {
    /// Creates a controller with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a controller serving `sequence` from successive health checks.
    #[must_use]
    pub fn with_health_sequence(sequence: impl IntoIterator<Item = ApplicationHealth>) -> Self {
        let controller = Self::new();
        controller.push_health(sequence);
        controller
    }

    /// Appends observations to the health script.
    pub fn push_health(&self, sequence: impl IntoIterator<Item = ApplicationHealth>) {
        if let Ok(mut state) = self.state.lock() {
            state.health.extend(sequence);
        }
    }

    /// Makes the next `count` upserts fail with a transport error.
    pub fn fail_next_upserts(&self, count: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_upserts = count;
        }
    }

    /// Makes the next `count` deletes fail with a transport error.
    pub fn fail_next_deletes(&self, count: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_deletes = count;
        }
    }

    /// Returns every call observed so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ControllerCall> {
        self.state
            .lock()
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    /// Returns whether the application currently exists.
    #[must_use]
    pub fn has_application(&self, app_name: &ApplicationName) -> bool {
        self.state
            .lock()
            .is_ok_and(|state| state.applications.contains(app_name))
    }

    fn lock(&self) -> ControllerResult<MutexGuard<'_, ScriptState>> {
        self.state
            .lock()
            .map_err(|err| ControllerError::transport(std::io::Error::other(err.to_string())))
    }
}

fn injected_failure(operation: &str) -> ControllerError {
    ControllerError::transport(std::io::Error::other(format!(
        "injected {operation} failure"
    )))
}

#[async_trait]
impl DeploymentController for ScriptedDeploymentController {
    async fn upsert_application(
        &self,
        request: &ApplicationRequest,
    ) -> ControllerResult<ControllerResponse> {
        let mut state = self.lock()?;
        state.calls.push(ControllerCall::Upsert(request.clone()));
        if state.failing_upserts > 0 {
            state.failing_upserts -= 1;
            return Err(injected_failure("upsert"));
        }
        let created = state.applications.insert(request.app_name.clone());
        Ok(ControllerResponse {
            created,
            body: json!({ "metadata": { "name": request.app_name.as_str() } }),
        })
    }

    async fn delete_application(&self, app_name: &ApplicationName) -> ControllerResult<()> {
        let mut state = self.lock()?;
        state.calls.push(ControllerCall::Delete(app_name.clone()));
        if state.failing_deletes > 0 {
            state.failing_deletes -= 1;
            return Err(injected_failure("delete"));
        }
        state.applications.remove(app_name);
        Ok(())
    }

    async fn application_health(&self, app_name: &ApplicationName) -> ApplicationHealth {
        let Ok(mut state) = self.state.lock() else {
            return ApplicationHealth::Unknown;
        };
        state.calls.push(ControllerCall::Health(app_name.clone()));
        let observed = state
            .health
            .pop_front()
            .or(state.last_health)
            .unwrap_or(ApplicationHealth::Progressing);
        state.last_health = Some(observed);
        observed
    }
}
