//! `PostgreSQL` task queue adapter.

mod models;
mod queue;
mod schema;

pub use queue::{PostgresTaskQueue, QueuePgPool};
