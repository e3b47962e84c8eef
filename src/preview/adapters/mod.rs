//! Adapter implementations for preview ports.

pub mod argocd;
pub mod memory;
pub mod postgres;
