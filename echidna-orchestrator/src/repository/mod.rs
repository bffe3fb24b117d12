//! Repository Module
//!
//! File access layer for the orchestrator.
//! Each repository handles the files of one concern.

pub mod result;
pub mod upload;

// Re-export for convenience
pub use result as result_repository;
pub use upload as upload_repository;
