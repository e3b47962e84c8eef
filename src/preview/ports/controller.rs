//! Deployment controller port.

use crate::preview::domain::{ApplicationHealth, ApplicationName, Namespace, PullRequestNumber};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Desired state of one preview application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationRequest {
    /// Controller application name.
    pub app_name: ApplicationName,
    /// Destination namespace.
    pub namespace: Namespace,
    /// Git clone URL of the source repository.
    pub repo_url: String,
    /// Chart path inside the repository.
    pub chart_path: String,
    /// Container image tag.
    pub image_tag: String,
    /// Public ingress host.
    pub host: String,
    /// Pull request the application previews.
    pub pr_number: PullRequestNumber,
}

/// Controller reply to an upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerResponse {
    /// Whether the application was created rather than updated.
    pub created: bool,
    /// Raw response body.
    pub body: serde_json::Value,
}

/// Contract for an external GitOps controller.
#[async_trait]
pub trait DeploymentController: Send + Sync {
    /// Creates or updates the application described by `request`.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] when the controller is unreachable or
    /// rejects the request.
    async fn upsert_application(
        &self,
        request: &ApplicationRequest,
    ) -> ControllerResult<ControllerResponse>;

    /// Deletes the application and its resources. An absent application is
    /// treated as deleted.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] when the controller is unreachable or
    /// rejects the request.
    async fn delete_application(&self, app_name: &ApplicationName) -> ControllerResult<()>;

    /// Reports application health. Never fails: errors surface as
    /// [`ApplicationHealth::Unknown`].
    async fn application_health(&self, app_name: &ApplicationName) -> ApplicationHealth;
}

/// Errors returned by controller adapters.
#[derive(Debug, Clone, Error)]
pub enum ControllerError {
    /// The controller answered with an unexpected status.
    #[error("controller returned HTTP {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The request could not be sent or the response not read.
    #[error("controller transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl ControllerError {
    /// Wraps a transport error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }
}
