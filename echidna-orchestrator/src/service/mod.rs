//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services drive request pipelines and own the in-memory request state.

pub mod auth;
pub mod notifier;
pub mod orchestrator;
pub mod registry;
pub mod request;

// Re-export for convenience
pub use request as request_service;
