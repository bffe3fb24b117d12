//! Echidna Core
//!
//! Core types and abstractions for the Echidna publication pipeline.
//!
//! This crate contains:
//! - Domain types: Jobs, request snapshots, submission methods and the job list
//! - DTOs: Data transfer objects shared by the orchestrator, client and CLI

pub mod domain;
pub mod dto;
pub mod error;

pub use error::CoreError;
