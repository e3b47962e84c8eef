//! Preview environment reconciliation for pull requests.
//!
//! Pull request events are recorded by the intake service and reconciled into
//! controller applications and environment records by the reconciliation
//! service. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
