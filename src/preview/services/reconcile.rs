//! Deployment-state reconciliation: dispatch, deploy, destroy and poll steps.

use async_trait::async_trait;
use mockable::Clock;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{PreviewSettings, ReconcileSettings, StalePollPolicy, UnknownHealthPolicy};
use crate::dispatch::{
    ReconciliationTask, RetryReason, StepOutcome, TaskEnvelope, TaskHandler, TaskKind,
    WorkflowResult,
};
use crate::preview::{
    domain::{
        ApplicationName, Environment, EnvironmentSpec, EnvironmentStatus, Event, EventType,
        HealthVerdict, PrAction, PreviewDomainError, PreviewNaming, PullRequestId,
    },
    ports::{
        ApplicationRequest, ChangeSet, ControllerError, DeploymentController,
        EnvironmentStatusWrite, EventSink, PreviewStore, StoreError,
    },
};

/// Errors raised while running a reconciliation step.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The pull request is not tracked.
    #[error("pull request not found: {0}")]
    PullRequestNotFound(PullRequestId),
    /// A domain rule rejected the step.
    #[error(transparent)]
    Domain(#[from] PreviewDomainError),
    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The controller failed.
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

impl ReconcileError {
    /// Returns whether running the step again may succeed.
    ///
    /// Controller failures and transient store failures are retried; see
    /// [`StoreError::is_transient`].
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_transient(),
            Self::Controller(_) => true,
            Self::PullRequestNotFound(_) | Self::Domain(_) => false,
        }
    }
}

/// Result type for reconciliation steps.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Runs the reconciliation workflow steps against the store and controller.
///
/// Each step re-reads the store, calls the controller at most once, and
/// commits its writes as one change set. Events are published after the
/// commit succeeds.
#[derive(Clone)]
pub struct ReconciliationService<S, D, E, C>
where
    S: PreviewStore,
    D: DeploymentController,
    E: EventSink,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    controller: Arc<D>,
    events: Arc<E>,
    clock: Arc<C>,
    preview: PreviewSettings,
    settings: ReconcileSettings,
}

impl<S, D, E, C> ReconciliationService<S, D, E, C>
where
    S: PreviewStore,
    D: DeploymentController,
    E: EventSink,
    C: Clock + Send + Sync,
{
    /// Creates a reconciliation service.
    #[must_use]
    pub const fn new(
        store: Arc<S>,
        controller: Arc<D>,
        events: Arc<E>,
        clock: Arc<C>,
        preview: PreviewSettings,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            store,
            controller,
            events,
            clock,
            preview,
            settings,
        }
    }

    /// Routes a pull request event to its follow-up step.
    #[must_use]
    pub fn handle_pr_event(&self, pr_id: PullRequestId, action: &PrAction) -> StepOutcome {
        info!(pr_id = %pr_id, action = %action, "processing pull request event");
        let (follow_up, task) = if action.triggers_deploy() {
            (TaskKind::Deploy, ReconciliationTask::Deploy { pr_id })
        } else if *action == PrAction::Closed {
            (TaskKind::Destroy, ReconciliationTask::Destroy { pr_id })
        } else {
            info!(pr_id = %pr_id, action = %action, "ignoring unhandled action");
            return StepOutcome::done(WorkflowResult::Ignored {
                action: action.clone(),
            });
        };
        StepOutcome::then(
            WorkflowResult::Dispatched {
                action: action.clone(),
                follow_up,
            },
            task,
        )
    }

    /// Submits the preview application and records the environment as
    /// provisioning, then schedules a health poll.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::PullRequestNotFound`] before any controller
    /// call when the pull request is unknown, or the first store, controller
    /// or domain error raised by the step.
    pub async fn deploy(&self, pr_id: PullRequestId) -> ReconcileResult<StepOutcome> {
        info!(pr_id = %pr_id, "deploying preview environment");
        let mut pull_request = self
            .store
            .find_pull_request(pr_id)
            .await?
            .ok_or(ReconcileError::PullRequestNotFound(pr_id))?;

        let number = pull_request.number();
        let names = self.preview.naming().names_for(number)?;
        let repository = self
            .preview
            .repository
            .as_ref()
            .unwrap_or_else(|| pull_request.repository());
        let image_tag = PreviewNaming::image_tag(pull_request.commit_sha());
        let request = ApplicationRequest {
            app_name: names.app_name.clone(),
            namespace: names.namespace.clone(),
            repo_url: PreviewNaming::repo_url(repository),
            chart_path: self.preview.helm_chart_path.clone(),
            image_tag: image_tag.clone(),
            host: names.host.clone(),
            pr_number: number,
        };
        let response = self.controller.upsert_application(&request).await?;
        debug!(
            app_name = %names.app_name,
            created = response.created,
            "controller accepted application"
        );

        let clock = &*self.clock;
        let mut changes = ChangeSet::new();
        let environment = match self.store.find_live_environment(pr_id).await? {
            Some(mut existing) => {
                existing.redeploy(names.url.clone(), clock)?;
                changes = changes.update_environment(existing.clone());
                existing
            }
            None => {
                let created = Environment::provision(
                    EnvironmentSpec {
                        pull_request_id: pr_id,
                        namespace: names.namespace.clone(),
                        url: names.url.clone(),
                        app_name: names.app_name.clone(),
                        resource_hints: self.preview.resource_hints.clone(),
                    },
                    clock,
                );
                changes = changes.insert_environment(created.clone());
                created
            }
        };
        pull_request.set_preview_url(Some(names.url.clone()), clock);

        let event = Event::new(
            EventType::DeployStarted,
            format!("Deploying preview environment for PR #{number}"),
            clock,
        )
        .for_pull_request(pr_id)
        .with_metadata(json!({
            "app_name": names.app_name.as_str(),
            "image_tag": image_tag,
            "generation": environment.generation(),
        }));
        self.store
            .apply(
                changes
                    .update_pull_request(pull_request)
                    .append_event(event.clone()),
            )
            .await?;
        self.publish(&event).await;

        info!(
            pr_id = %pr_id,
            app_name = %names.app_name,
            generation = environment.generation(),
            "preview environment deployment initiated"
        );
        Ok(StepOutcome::then(
            WorkflowResult::Deploying {
                app_name: names.app_name.clone(),
                url: names.url,
                generation: environment.generation(),
            },
            ReconciliationTask::Poll {
                pr_id,
                app_name: names.app_name,
                generation: environment.generation(),
            },
        ))
    }

    /// Deletes the preview application and records the environment as
    /// destroyed.
    ///
    /// Finishes as [`WorkflowResult::Skipped`] when the pull request has no
    /// live environment.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::PullRequestNotFound`] before any controller
    /// call when the pull request is unknown, or the first store, controller
    /// or domain error raised by the step.
    pub async fn destroy(&self, pr_id: PullRequestId) -> ReconcileResult<StepOutcome> {
        info!(pr_id = %pr_id, "destroying preview environment");
        let mut pull_request = self
            .store
            .find_pull_request(pr_id)
            .await?
            .ok_or(ReconcileError::PullRequestNotFound(pr_id))?;
        let Some(mut environment) = self.store.find_live_environment(pr_id).await? else {
            warn!(pr_id = %pr_id, "no environment to destroy");
            return Ok(StepOutcome::done(WorkflowResult::Skipped));
        };

        let app_name = environment.app_name().clone();
        self.controller.delete_application(&app_name).await?;

        let clock = &*self.clock;
        environment.tear_down(clock)?;
        pull_request.set_preview_url(None, clock);
        let event = Event::new(
            EventType::EnvDestroyed,
            format!(
                "Preview environment destroyed for PR #{}",
                pull_request.number()
            ),
            clock,
        )
        .for_pull_request(pr_id)
        .with_metadata(json!({ "app_name": app_name.as_str() }));
        self.store
            .apply(
                ChangeSet::new()
                    .update_environment(environment)
                    .update_pull_request(pull_request)
                    .append_event(event.clone()),
            )
            .await?;
        self.publish(&event).await;

        info!(pr_id = %pr_id, app_name = %app_name, "preview environment destroyed");
        Ok(StepOutcome::done(WorkflowResult::Destroyed { app_name }))
    }

    /// Observes controller health once and records a terminal verdict.
    ///
    /// A non-terminal observation yields [`StepOutcome::Retryable`] with
    /// [`RetryReason::NotConverged`], leaving the environment untouched.
    /// The verdict only writes the status, and only if the environment is
    /// unchanged since it was read; a concurrent deploy or teardown makes the
    /// step retry against fresh state, or end as superseded under
    /// [`StalePollPolicy::Discard`].
    ///
    /// # Errors
    ///
    /// Returns the first store or domain error raised by the step.
    pub async fn poll(
        &self,
        pr_id: PullRequestId,
        app_name: &ApplicationName,
        generation: u64,
    ) -> ReconcileResult<StepOutcome> {
        let health = self.controller.application_health(app_name).await;
        let unknown_is_failure = self.settings.unknown_health == UnknownHealthPolicy::Fail;
        let (target, result) = match health.verdict(unknown_is_failure) {
            HealthVerdict::Pending => {
                info!(
                    pr_id = %pr_id,
                    app_name = %app_name,
                    health = %health,
                    "deployment still in progress"
                );
                return Ok(StepOutcome::Retryable(RetryReason::NotConverged(health)));
            }
            HealthVerdict::Ready => (
                EnvironmentStatus::Running,
                WorkflowResult::Ready {
                    app_name: app_name.clone(),
                },
            ),
            HealthVerdict::Failed => (
                EnvironmentStatus::Failed,
                WorkflowResult::Failed {
                    app_name: app_name.clone(),
                    health,
                },
            ),
        };

        let Some(mut environment) = self.store.find_live_environment_by_app_name(app_name).await?
        else {
            warn!(app_name = %app_name, health = %health, "no live environment for application");
            return Ok(StepOutcome::done(WorkflowResult::NoEnvironment {
                app_name: app_name.clone(),
            }));
        };

        let current = environment.generation();
        if self.settings.stale_poll == StalePollPolicy::Discard && current != generation {
            info!(
                app_name = %app_name,
                generation,
                current,
                "discarding poll for superseded deploy"
            );
            return Ok(StepOutcome::done(WorkflowResult::Superseded {
                generation,
                current,
            }));
        }
        if environment.status() == target {
            debug!(app_name = %app_name, status = %target, "environment already settled");
            return Ok(StepOutcome::done(result));
        }

        let clock = &*self.clock;
        let write = EnvironmentStatusWrite::from_observed(&environment, target);
        environment.settle_status(target)?;
        let event = if target == EnvironmentStatus::Running {
            Event::new(
                EventType::EnvReady,
                format!("Preview environment ready: {}", environment.url()),
                clock,
            )
        } else {
            Event::new(
                EventType::EnvFailed,
                format!("Deployment failed for {app_name}: {health}"),
                clock,
            )
        }
        .for_pull_request(environment.pull_request_id())
        .with_metadata(json!({
            "app_name": app_name.as_str(),
            "health": health.as_str(),
            "generation": current,
        }));
        let committed = self
            .store
            .apply(
                ChangeSet::new()
                    .set_environment_status(write)
                    .append_event(event.clone()),
            )
            .await;
        match committed {
            Ok(()) => {}
            Err(StoreError::StaleEnvironment {
                current_generation, ..
            }) if self.settings.stale_poll == StalePollPolicy::Discard
                && current_generation != generation =>
            {
                info!(
                    app_name = %app_name,
                    generation,
                    current = current_generation,
                    "deploy superseded the poll before its verdict was stored"
                );
                return Ok(StepOutcome::done(WorkflowResult::Superseded {
                    generation,
                    current: current_generation,
                }));
            }
            Err(err) => return Err(err.into()),
        }
        self.publish(&event).await;

        if target == EnvironmentStatus::Running {
            info!(pr_id = %pr_id, app_name = %app_name, "deployment healthy");
        } else {
            warn!(pr_id = %pr_id, app_name = %app_name, health = %health, "deployment failed");
        }
        Ok(StepOutcome::done(result))
    }

    async fn publish(&self, event: &Event) {
        if let Err(err) = self.events.publish(event).await {
            warn!(
                event_id = %event.id(),
                event_type = %event.event_type(),
                error = %err,
                "failed to publish event"
            );
        }
    }

    async fn run(&self, task: &ReconciliationTask) -> ReconcileResult<StepOutcome> {
        match task {
            ReconciliationTask::HandlePrEvent { pr_id, action } => {
                Ok(self.handle_pr_event(*pr_id, action))
            }
            ReconciliationTask::Deploy { pr_id } => self.deploy(*pr_id).await,
            ReconciliationTask::Destroy { pr_id } => self.destroy(*pr_id).await,
            ReconciliationTask::Poll {
                pr_id,
                app_name,
                generation,
            } => self.poll(*pr_id, app_name, *generation).await,
        }
    }
}

#[async_trait]
impl<S, D, E, C> TaskHandler for ReconciliationService<S, D, E, C>
where
    S: PreviewStore + 'static,
    D: DeploymentController + 'static,
    E: EventSink + 'static,
    C: Clock + Send + Sync + 'static,
{
    async fn handle(&self, envelope: &TaskEnvelope) -> StepOutcome {
        match self.run(&envelope.task).await {
            Ok(outcome) => outcome,
            Err(err) if err.is_retryable() => {
                warn!(
                    task_id = %envelope.id,
                    attempt = envelope.attempt,
                    error = %err,
                    "reconciliation step failed"
                );
                StepOutcome::Retryable(RetryReason::Transient(err.to_string()))
            }
            Err(err) => StepOutcome::Fatal(err.to_string()),
        }
    }
}
