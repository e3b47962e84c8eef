//! Diesel row models for preview persistence.

use super::schema::{environments, events, pipelines, pull_requests};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

/// Pull request row, used for reads and inserts.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = pull_requests)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PullRequestRow {
    /// Internal identifier.
    pub id: Uuid,
    /// Repository name.
    pub repository: String,
    /// Pull request number.
    pub number: i64,
    /// Title.
    pub title: String,
    /// Author login.
    pub author: String,
    /// Head branch.
    pub head_branch: String,
    /// Base branch.
    pub base_branch: String,
    /// Lifecycle status.
    pub status: String,
    /// Latest head commit.
    pub commit_sha: Option<String>,
    /// Preview URL.
    pub preview_url: Option<String>,
    /// Browser URL.
    pub github_url: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Mutable pull request columns.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = pull_requests)]
#[diesel(treat_none_as_null = true)]
pub struct PullRequestChangeset {
    /// Title.
    pub title: String,
    /// Lifecycle status.
    pub status: String,
    /// Latest head commit.
    pub commit_sha: Option<String>,
    /// Preview URL.
    pub preview_url: Option<String>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Pipeline row, used for reads and inserts.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = pipelines)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PipelineRow {
    /// Internal identifier.
    pub id: Uuid,
    /// Owning pull request.
    pub pull_request_id: Uuid,
    /// Commit under test.
    pub commit_sha: Option<String>,
    /// Run status.
    pub status: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Environment row, used for reads and inserts.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = environments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EnvironmentRow {
    /// Internal identifier.
    pub id: Uuid,
    /// Owning pull request.
    pub pull_request_id: Uuid,
    /// Namespace.
    pub namespace: String,
    /// Preview URL.
    pub url: String,
    /// Controller application name.
    pub app_name: String,
    /// Status.
    pub status: String,
    /// CPU request hint.
    pub cpu_request: Option<String>,
    /// CPU limit hint.
    pub cpu_limit: Option<String>,
    /// Memory request hint.
    pub memory_request: Option<String>,
    /// Memory limit hint.
    pub memory_limit: Option<String>,
    /// Deploy generation.
    pub generation: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Teardown timestamp.
    pub destroyed_at: Option<DateTime<Utc>>,
}

/// Mutable environment columns.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = environments)]
#[diesel(treat_none_as_null = true)]
pub struct EnvironmentChangeset {
    /// Preview URL.
    pub url: String,
    /// Status.
    pub status: String,
    /// Deploy generation.
    pub generation: i64,
    /// Teardown timestamp.
    pub destroyed_at: Option<DateTime<Utc>>,
}

/// Event row returned by queries.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EventRow {
    /// Internal identifier.
    pub id: Uuid,
    /// Event type.
    pub event_type: String,
    /// Message.
    pub message: String,
    /// Structured metadata.
    pub metadata: Option<Value>,
    /// Linked pull request.
    pub pull_request_id: Option<Uuid>,
    /// Linked pipeline.
    pub pipeline_id: Option<Uuid>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Insert model for events; `seq` is assigned by the database.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = events)]
pub struct NewEventRow {
    /// Internal identifier.
    pub id: Uuid,
    /// Event type.
    pub event_type: String,
    /// Message.
    pub message: String,
    /// Structured metadata.
    pub metadata: Option<Value>,
    /// Linked pull request.
    pub pull_request_id: Option<Uuid>,
    /// Linked pipeline.
    pub pipeline_id: Option<Uuid>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
