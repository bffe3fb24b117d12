//! Delegated steps
//!
//! Resource retrieval, the conformance checker, the transition rules and the
//! publication steps live in a separate validator service. Each step is a
//! `POST <base>/<step-name>` with the request context as JSON, answered with
//! `{ "status": ..., "errors": [...] }`.

use async_trait::async_trait;
use echidna_core::domain::job::JobName;
use echidna_core::domain::state::RequestState;
use serde::Serialize;
use tracing::{debug, warn};

use super::{StepContext, StepExecutor, StepFault, StepOutcome};

#[derive(Serialize)]
struct StepRequest<'a> {
    step: JobName,
    #[serde(flatten)]
    context: &'a StepContext,
    results: &'a RequestState,
}

/// Step executed by the validator service
pub struct RemoteStep {
    client: reqwest::Client,
    base_url: String,
    name: JobName,
}

impl RemoteStep {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, name: JobName) -> Self {
        let base_url = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            name,
        }
    }

    fn url(&self) -> String {
        format!("{}/{}", self.base_url, self.name)
    }

    fn transport(&self, message: impl ToString) -> StepFault {
        StepFault::Transport {
            step: self.name,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl StepExecutor for RemoteStep {
    async fn execute(
        &self,
        ctx: &StepContext,
        state: &RequestState,
    ) -> Result<StepOutcome, StepFault> {
        let url = self.url();
        debug!("Delegating step {} to {}", self.name, url);

        let response = self
            .client
            .post(&url)
            .json(&StepRequest {
                step: self.name,
                context: ctx,
                results: state,
            })
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(self.transport(format!("status {}: {}", status.as_u16(), body)));
        }

        let outcome: StepOutcome = response.json().await.map_err(|e| self.transport(e))?;
        if !outcome.status.is_terminal() {
            return Err(StepFault::InvalidOutcome {
                step: self.name,
                status: outcome.status,
            });
        }

        Ok(outcome)
    }
}

/// Stand-in for a step with no validator service configured
pub struct SkippedStep {
    name: JobName,
}

impl SkippedStep {
    pub fn new(name: JobName) -> Self {
        Self { name }
    }
}

#[async_trait]
impl StepExecutor for SkippedStep {
    async fn execute(
        &self,
        ctx: &StepContext,
        _state: &RequestState,
    ) -> Result<StepOutcome, StepFault> {
        warn!(
            "No validator configured, skipping step {} for request {}",
            self.name, ctx.id
        );
        Ok(StepOutcome::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echidna_core::domain::request::DocumentSource;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn context() -> StepContext {
        StepContext {
            id: Uuid::new_v4(),
            source: DocumentSource::Url("https://example.org/doc".to_string()),
            tar_path: None,
            token: Some("secret".to_string()),
            user: None,
            decision: "https://lists.w3.org/decision".to_string(),
            temp_location: PathBuf::from("/tmp/echidna/x/"),
            http_location: "http://localhost/trs/x/Overview.html".to_string(),
            result_location: PathBuf::from("/tmp/results"),
            origin: None,
        }
    }

    #[test]
    fn test_remote_url() {
        let step = RemoteStep::new(
            reqwest::Client::new(),
            "http://validator:9000/",
            JobName::ThirdPartyChecker,
        );
        assert_eq!(step.url(), "http://validator:9000/third-party-checker");
    }

    #[test]
    fn test_step_request_body() {
        let ctx = context();
        let state = RequestState::new(&[JobName::Metadata]);
        let body = serde_json::to_value(StepRequest {
            step: JobName::Metadata,
            context: &ctx,
            results: &state,
        })
        .unwrap();

        assert_eq!(body["step"], "metadata");
        assert_eq!(body["url"], "https://example.org/doc");
        assert_eq!(body["token"], "secret");
        assert_eq!(body["results"]["status"], "running");
        assert!(body.get("origin").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_validator_is_a_fault() {
        let step = RemoteStep::new(reqwest::Client::new(), "http://127.0.0.1:1", JobName::Publish);
        let state = RequestState::new(&[JobName::Publish]);

        let result = step.execute(&context(), &state).await;
        assert!(matches!(
            result,
            Err(StepFault::Transport {
                step: JobName::Publish,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_skipped_step_succeeds() {
        let step = SkippedStep::new(JobName::TrInstall);
        let state = RequestState::new(&[JobName::TrInstall]);
        assert_eq!(
            step.execute(&context(), &state).await.unwrap(),
            StepOutcome::success()
        );
    }
}
