//! Diesel row models for the durable task queue.

use super::schema::reconciliation_tasks;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

/// Insert model for newly enqueued tasks.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = reconciliation_tasks)]
pub struct NewTaskRow {
    /// Task identifier.
    pub id: Uuid,
    /// Task kind.
    pub kind: String,
    /// Serialized task.
    pub payload: Value,
    /// Queue status.
    pub status: String,
    /// Execution number.
    pub attempt: i32,
    /// First enqueue time.
    pub enqueued_at: DateTime<Utc>,
    /// Earliest reservation time.
    pub available_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
}

/// Row returned by the reservation query.
#[derive(Debug, Clone, QueryableByName)]
pub struct ReservedTaskRow {
    /// Task identifier.
    #[diesel(sql_type = diesel::sql_types::Uuid)]
    pub id: Uuid,
    /// Serialized task.
    #[diesel(sql_type = diesel::sql_types::Jsonb)]
    pub payload: Value,
    /// Execution number.
    #[diesel(sql_type = diesel::sql_types::Int4)]
    pub attempt: i32,
    /// First enqueue time.
    #[diesel(sql_type = diesel::sql_types::Timestamptz)]
    pub enqueued_at: DateTime<Utc>,
    /// Earliest reservation time.
    #[diesel(sql_type = diesel::sql_types::Timestamptz)]
    pub available_at: DateTime<Utc>,
}
