//! Step executors
//!
//! Each pipeline step is an external collaborator behind the
//! [`StepExecutor`] trait. The orchestrator owns the job transitions; an
//! executor only reports the outcome of its own check, so it cannot touch
//! any other job of the request.
//!
//! - `ip_checker`: fan-in allow-list check for token submissions
//! - `sources`: the allow-list sources queried by the IP check
//! - `remote`: steps delegated to the validator service over HTTP

pub mod ip_checker;
pub mod remote;
pub mod sources;

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use echidna_core::domain::job::{JobName, JobStatus};
use echidna_core::domain::request::DocumentSource;
use echidna_core::domain::state::RequestState;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;

pub use ip_checker::{IpChecker, SourcePolicy};
pub use remote::{RemoteStep, SkippedStep};
pub use sources::{AllowListSource, DnsSource, GithubMetaSource, SourceError};

/// Everything a step may need to know about the request it runs for
#[derive(Debug, Clone, Serialize)]
pub struct StepContext {
    pub id: Uuid,
    #[serde(flatten)]
    pub source: DocumentSource,
    /// Staged archive, for tar submissions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tar_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Authenticated user, for credential submissions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub decision: String,
    pub temp_location: PathBuf,
    pub http_location: String,
    pub result_location: PathBuf,
    /// Address the request came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<IpAddr>,
}

/// Terminal result of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub status: JobStatus,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl StepOutcome {
    pub fn success() -> Self {
        Self {
            status: JobStatus::Success,
            errors: Vec::new(),
        }
    }

    pub fn failure(errors: Vec<String>) -> Self {
        Self {
            status: JobStatus::Failure,
            errors,
        }
    }

    pub fn warning(errors: Vec<String>) -> Self {
        Self {
            status: JobStatus::Warning,
            errors,
        }
    }

    /// `success` when there is nothing to report, `failure` otherwise
    pub fn from_errors(errors: Vec<String>) -> Self {
        if errors.is_empty() {
            Self::success()
        } else {
            Self::failure(errors)
        }
    }
}

/// A step that could not complete at all
///
/// Distinct from a validation failure, which is a [`StepOutcome`].
#[derive(Debug, Error)]
pub enum StepFault {
    #[error("No executor registered for step '{0}'")]
    NotRegistered(JobName),

    #[error("Step '{step}' transport error: {message}")]
    Transport { step: JobName, message: String },

    #[error("Step '{step}' returned a non-terminal status: {status}")]
    InvalidOutcome { step: JobName, status: JobStatus },

    #[error("Step '{step}' failed: {message}")]
    Internal { step: JobName, message: String },
}

/// Service trait for one pipeline step
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Runs the step
    ///
    /// # Arguments
    /// * `ctx` - The request being processed
    /// * `state` - Snapshot at the time the step started, read-only
    ///
    /// # Returns
    /// The step outcome, or a fault when the step could not run at all
    async fn execute(&self, ctx: &StepContext, state: &RequestState)
    -> Result<StepOutcome, StepFault>;
}

/// Executors by step name
#[derive(Clone, Default)]
pub struct StepRegistry {
    executors: HashMap<JobName, Arc<dyn StepExecutor>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the executor for a step, replacing any previous one
    pub fn register(&mut self, name: JobName, executor: Arc<dyn StepExecutor>) -> &mut Self {
        self.executors.insert(name, executor);
        self
    }

    pub fn get(&self, name: JobName) -> Result<Arc<dyn StepExecutor>, StepFault> {
        self.executors
            .get(&name)
            .cloned()
            .ok_or(StepFault::NotRegistered(name))
    }

    /// Production registry
    ///
    /// The IP check runs locally against GitHub Actions and Travis CI. Every
    /// other step goes to the validator service when one is configured and
    /// is skipped otherwise.
    pub fn from_config(config: &Config) -> Self {
        let http = reqwest::Client::new();
        let mut registry = Self::new();

        let sources: Vec<Arc<dyn AllowListSource>> = vec![
            Arc::new(GithubMetaSource::new(
                http.clone(),
                config.gh_api_url.clone(),
                config.gh_token.clone(),
            )),
            Arc::new(DnsSource::new(config.travis_host.clone())),
        ];
        registry.register(
            JobName::IpChecker,
            Arc::new(IpChecker::new(
                sources,
                config.source_timeout,
                config.source_policy,
            )),
        );

        for name in JobName::ALL {
            if name == JobName::IpChecker {
                continue;
            }
            let executor: Arc<dyn StepExecutor> = match &config.steps_url {
                Some(base) => Arc::new(RemoteStep::new(http.clone(), base.clone(), name)),
                None => Arc::new(SkippedStep::new(name)),
            };
            registry.register(name, executor);
        }

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_errors() {
        assert_eq!(StepOutcome::from_errors(vec![]), StepOutcome::success());
        let outcome = StepOutcome::from_errors(vec!["bad".to_string()]);
        assert_eq!(outcome.status, JobStatus::Failure);
    }

    #[test]
    fn test_registry_from_config_covers_every_step() {
        let registry = StepRegistry::from_config(&Config::default());
        for name in JobName::ALL {
            assert!(registry.get(name).is_ok(), "missing executor for {}", name);
        }
    }

    #[test]
    fn test_missing_executor_is_a_fault() {
        let registry = StepRegistry::new();
        assert!(matches!(
            registry.get(JobName::Publish),
            Err(StepFault::NotRegistered(JobName::Publish))
        ));
    }
}
