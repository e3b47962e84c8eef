//! HTTP client for the Argo CD applications API.

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::descriptor::{ApplicationDescriptor, ApplicationStatusBody};
use crate::config::ControllerSettings;
use crate::preview::{
    domain::{ApplicationHealth, ApplicationName},
    ports::{
        ApplicationRequest, ControllerError, ControllerResponse, ControllerResult,
        DeploymentController,
    },
};

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Argo CD REST client implementing [`DeploymentController`].
#[derive(Clone)]
pub struct ArgoCdClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
    mutate_timeout: Duration,
    status_timeout: Duration,
}

impl std::fmt::Debug for ArgoCdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgoCdClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl ArgoCdClient {
    /// Creates a client from controller settings.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Transport`] when the HTTP client cannot be
    /// built, for example when no TLS backend is available.
    pub fn new(settings: &ControllerSettings) -> ControllerResult<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(settings.insecure_tls)
            .build()
            .map_err(ControllerError::transport)?;
        Ok(Self {
            base_url: settings.server.trim_end_matches('/').to_owned(),
            token: settings.token.clone(),
            client,
            mutate_timeout: settings.mutate_timeout,
            status_timeout: settings.status_timeout,
        })
    }

    fn applications_url(&self) -> String {
        format!("{}/api/v1/applications", self.base_url)
    }

    fn application_url(&self, app_name: &ApplicationName) -> String {
        format!("{}/api/v1/applications/{app_name}", self.base_url)
    }

    async fn send_descriptor(
        &self,
        builder: reqwest::RequestBuilder,
        descriptor: &ApplicationDescriptor,
    ) -> ControllerResult<Response> {
        builder
            .bearer_auth(&self.token)
            .timeout(self.mutate_timeout)
            .json(descriptor)
            .send()
            .await
            .map_err(ControllerError::transport)
    }
}

async fn ensure_success(response: Response) -> ControllerResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ControllerError::UnexpectedStatus {
        status: status.as_u16(),
        body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    })
}

#[async_trait]
impl DeploymentController for ArgoCdClient {
    async fn upsert_application(
        &self,
        request: &ApplicationRequest,
    ) -> ControllerResult<ControllerResponse> {
        let descriptor = ApplicationDescriptor::from_request(request);
        let app_name = &request.app_name;

        let updated = self
            .send_descriptor(self.client.put(self.application_url(app_name)), &descriptor)
            .await?;
        let (response, created) = if updated.status() == StatusCode::NOT_FOUND {
            debug!(app_name = %app_name, "application absent, creating");
            let posted = self
                .send_descriptor(self.client.post(self.applications_url()), &descriptor)
                .await?;
            (posted, true)
        } else {
            (updated, false)
        };

        let accepted = ensure_success(response).await?;
        let bytes = accepted.bytes().await.map_err(ControllerError::transport)?;
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        info!(app_name = %app_name, created, "controller application upserted");
        Ok(ControllerResponse { created, body })
    }

    async fn delete_application(&self, app_name: &ApplicationName) -> ControllerResult<()> {
        let response = self
            .client
            .delete(self.application_url(app_name))
            .query(&[("cascade", "true")])
            .bearer_auth(&self.token)
            .timeout(self.mutate_timeout)
            .send()
            .await
            .map_err(ControllerError::transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!(app_name = %app_name, "controller application already absent");
            return Ok(());
        }
        ensure_success(response).await?;
        info!(app_name = %app_name, "controller application deleted");
        Ok(())
    }

    async fn application_health(&self, app_name: &ApplicationName) -> ApplicationHealth {
        let result = self
            .client
            .get(self.application_url(app_name))
            .bearer_auth(&self.token)
            .timeout(self.status_timeout)
            .send()
            .await;
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                warn!(app_name = %app_name, error = %err, "controller status request failed");
                return ApplicationHealth::Unknown;
            }
        };
        if response.status() == StatusCode::NOT_FOUND {
            return ApplicationHealth::Missing;
        }
        let accepted = match ensure_success(response).await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(app_name = %app_name, error = %err, "controller status request rejected");
                return ApplicationHealth::Unknown;
            }
        };
        let body = match accepted.json::<ApplicationStatusBody>().await {
            Ok(body) => body,
            Err(err) => {
                warn!(app_name = %app_name, error = %err, "controller status body unreadable");
                return ApplicationHealth::Unknown;
            }
        };

        let health = body
            .health()
            .map_or(ApplicationHealth::Unknown, ApplicationHealth::from_controller);
        info!(
            app_name = %app_name,
            health = %health,
            sync = body.sync().unwrap_or("Unknown"),
            "controller application status"
        );
        health
    }
}
