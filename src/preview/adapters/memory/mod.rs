//! In-memory adapters for tests and single-process deployments.

pub mod controller;
pub mod events;
pub mod store;

pub use controller::{ControllerCall, ScriptedDeploymentController};
pub use events::BroadcastEventSink;
pub use store::InMemoryPreviewStore;
