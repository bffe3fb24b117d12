//! Error types for the Echidna domain

use thiserror::Error;

use crate::domain::job::{JobName, JobStatus};

/// Errors raised when a domain invariant would be violated
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A job was asked to move backwards or skip a state
    #[error("Invalid transition for job '{job}': {from} -> {to}")]
    InvalidTransition {
        job: JobName,
        from: JobStatus,
        to: JobStatus,
    },

    /// The snapshot has no job with this name
    #[error("Job '{0}' is not part of this request")]
    UnknownJob(JobName),

    /// A step name that does not belong to the pipeline
    #[error("Unknown step name: {0}")]
    UnknownStep(String),

    /// The submission does not match exactly one accepted method
    #[error("{0}")]
    InvalidSubmission(String),
}
