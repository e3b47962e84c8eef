//! Notification sink port for committed events.

use crate::preview::domain::Event;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Receives events after they are committed to the store.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publishes one committed event.
    ///
    /// # Errors
    ///
    /// Returns [`EventSinkError`] when delivery fails. Callers log and move on.
    async fn publish(&self, event: &Event) -> Result<(), EventSinkError>;
}

/// Error returned by event sinks.
#[derive(Debug, Clone, Error)]
#[error("event sink delivery failed: {0}")]
pub struct EventSinkError(pub Arc<dyn std::error::Error + Send + Sync>);

impl EventSinkError {
    /// Wraps a delivery error.
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Arc::new(err))
    }
}
