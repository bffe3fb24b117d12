//! Job domain types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Name of a pipeline step
///
/// Every job in a request is identified by one of these. The serialized form
/// is the kebab-case name used in the status JSON (e.g. `tr-install`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobName {
    IpChecker,
    RetrieveResources,
    Metadata,
    UserChecker,
    Specberus,
    TokenChecker,
    TransitionChecker,
    ThirdPartyChecker,
    Publish,
    TrInstall,
    UpdateTrShortlink,
}

impl JobName {
    /// All step names, in no particular pipeline order
    pub const ALL: [JobName; 11] = [
        JobName::IpChecker,
        JobName::RetrieveResources,
        JobName::Metadata,
        JobName::UserChecker,
        JobName::Specberus,
        JobName::TokenChecker,
        JobName::TransitionChecker,
        JobName::ThirdPartyChecker,
        JobName::Publish,
        JobName::TrInstall,
        JobName::UpdateTrShortlink,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobName::IpChecker => "ip-checker",
            JobName::RetrieveResources => "retrieve-resources",
            JobName::Metadata => "metadata",
            JobName::UserChecker => "user-checker",
            JobName::Specberus => "specberus",
            JobName::TokenChecker => "token-checker",
            JobName::TransitionChecker => "transition-checker",
            JobName::ThirdPartyChecker => "third-party-checker",
            JobName::Publish => "publish",
            JobName::TrInstall => "tr-install",
            JobName::UpdateTrShortlink => "update-tr-shortlink",
        }
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| CoreError::UnknownStep(s.to_string()))
    }
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failure,
    Warning,
}

impl JobStatus {
    /// Whether no further transition is allowed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failure | JobStatus::Warning
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
            JobStatus::Warning => "warning",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status record of one pipeline step
///
/// Jobs are values: `start` and `finish` return a new job and leave the
/// original untouched. Status only moves forward,
/// `pending -> running -> {success, failure, warning}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub status: JobStatus,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A job that has not run yet
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            errors: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Move a pending job to running
    pub fn start(&self, name: JobName, at: DateTime<Utc>) -> Result<Job, CoreError> {
        if self.status != JobStatus::Pending {
            return Err(CoreError::InvalidTransition {
                job: name,
                from: self.status,
                to: JobStatus::Running,
            });
        }

        Ok(Job {
            status: JobStatus::Running,
            errors: Vec::new(),
            started_at: Some(at),
            finished_at: None,
        })
    }

    /// Move a running job to a terminal status
    ///
    /// Errors are dropped on success; a successful job carries none.
    pub fn finish(
        &self,
        name: JobName,
        status: JobStatus,
        errors: Vec<String>,
        at: DateTime<Utc>,
    ) -> Result<Job, CoreError> {
        if self.status != JobStatus::Running || !status.is_terminal() {
            return Err(CoreError::InvalidTransition {
                job: name,
                from: self.status,
                to: status,
            });
        }

        let errors = if status == JobStatus::Success {
            Vec::new()
        } else {
            errors
        };

        Ok(Job {
            status,
            errors,
            started_at: self.started_at,
            finished_at: Some(at),
        })
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::pending()
    }
}
