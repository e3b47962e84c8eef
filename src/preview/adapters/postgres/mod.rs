//! `PostgreSQL` adapters for preview persistence.

mod models;
mod schema;
mod store;

pub use store::{PostgresPreviewStore, PreviewPgPool};
