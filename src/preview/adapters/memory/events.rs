//! Broadcast-channel event sink for dashboard subscribers.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::preview::{
    domain::Event,
    ports::{EventSink, EventSinkError},
};

/// Event sink fanning committed events out to in-process subscribers.
///
/// Publishing with no subscribers succeeds; slow subscribers observe
/// `RecvError::Lagged` rather than blocking publishers.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<Event>,
}

impl BroadcastEventSink {
    /// Creates a sink buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn publish(&self, event: &Event) -> Result<(), EventSinkError> {
        if self.sender.send(event.clone()).is_err() {
            debug!(event_type = %event.event_type(), "no event subscribers");
        }
        Ok(())
    }
}
