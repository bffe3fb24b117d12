//! Core domain types
//!
//! This module contains the core domain structures used across Echidna services.
//! The orchestrator advances them, the client and CLI read them back from the
//! status endpoint.

pub mod job;
pub mod request;
pub mod state;
pub mod submission;
