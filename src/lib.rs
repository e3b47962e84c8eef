//! `SnapEnv`: preview environments for pull requests.
//!
//! This crate tracks pull requests, deploys one preview environment per open
//! pull request through a GitOps controller, and tears it down when the pull
//! request closes. Work runs as retryable tasks on a durable queue.
//!
//! # Architecture
//!
//! `SnapEnv` follows hexagonal architecture principles:
//!
//! - **Domain**: Pull requests, environments and events with no
//!   infrastructure dependencies
//! - **Ports**: Store, controller and event sink traits
//! - **Adapters**: In-memory, `PostgreSQL` and Argo CD implementations
//!
//! # Modules
//!
//! - [`preview`]: Preview domain, ports, adapters and reconciliation services
//! - [`dispatch`]: Task queue, retry policies and worker slots
//! - [`config`]: Worker settings
//! - [`observability`]: Logging setup

pub mod config;
pub mod dispatch;
pub mod observability;
pub mod preview;
