//! Request Service
//!
//! Business logic for publication requests: turning a submission into a
//! request record, running its pipeline in the background, and persisting
//! and announcing the result.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use echidna_core::CoreError;
use echidna_core::domain::request::{DocumentSource, RequestRecord};
use echidna_core::domain::state::RequestState;
use echidna_core::domain::submission::{SubmissionKind, job_list};
use echidna_core::dto::request::SubmissionForm;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::repository::{result_repository, upload_repository};
use crate::service::notifier::Notifier;
use crate::service::orchestrator::Orchestrator;
use crate::service::registry::RequestRegistry;
use crate::steps::{StepContext, StepRegistry};

/// Version reported in request records and by the API
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error recorded on the interrupted job when a pipeline faults
const INTERNAL_ERROR: &str = "An internal error occurred while processing the request.";

/// Service error type
#[derive(Debug)]
pub enum SubmitError {
    InvalidSubmission(String),
    StagingError(std::io::Error),
    ShuttingDown,
}

impl From<CoreError> for SubmitError {
    fn from(err: CoreError) -> Self {
        SubmitError::InvalidSubmission(err.to_string())
    }
}

impl From<std::io::Error> for SubmitError {
    fn from(err: std::io::Error) -> Self {
        SubmitError::StagingError(err)
    }
}

/// Uploaded archive
#[derive(Debug, Clone)]
pub struct TarUpload {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Accepted combinations of document and authorization
#[derive(Debug, Clone)]
pub enum SubmissionMethod {
    UrlToken { url: String, token: String },
    TarToken { tar: TarUpload, token: String },
    TarCredentials { tar: TarUpload, user: String },
}

impl SubmissionMethod {
    pub fn kind(&self) -> SubmissionKind {
        match self {
            SubmissionMethod::UrlToken { .. } => SubmissionKind::UrlToken,
            SubmissionMethod::TarToken { .. } => SubmissionKind::TarToken,
            SubmissionMethod::TarCredentials { .. } => SubmissionKind::TarCredentials,
        }
    }
}

/// A validated publication request
#[derive(Debug, Clone)]
pub struct Submission {
    pub method: SubmissionMethod,
    pub decision: String,
    pub dry_run: bool,
    pub cc: Option<String>,
    pub origin: Option<IpAddr>,
}

impl Submission {
    /// Builds a submission from the request fields
    ///
    /// # Arguments
    /// * `form` - Form fields of the request
    /// * `tar` - Uploaded archive, for multipart requests
    /// * `user` - Authenticated user, when basic credentials were verified
    /// * `origin` - Address the request came from
    pub fn from_parts(
        form: SubmissionForm,
        tar: Option<TarUpload>,
        user: Option<String>,
        origin: Option<IpAddr>,
    ) -> Result<Submission, CoreError> {
        let url = SubmissionForm::non_empty(&form.url).map(String::from);
        let token = SubmissionForm::non_empty(&form.token).map(String::from);
        let decision = SubmissionForm::non_empty(&form.decision).map(String::from);

        let kind = SubmissionKind::resolve(
            url.is_some(),
            tar.is_some(),
            token.is_some(),
            user.is_some(),
            decision.is_some(),
        )?;

        let method = match (kind, url, tar, token, user) {
            (SubmissionKind::UrlToken, Some(url), _, Some(token), _) => {
                SubmissionMethod::UrlToken { url, token }
            }
            (SubmissionKind::TarToken, _, Some(tar), Some(token), _) => {
                SubmissionMethod::TarToken { tar, token }
            }
            (SubmissionKind::TarCredentials, _, Some(tar), _, Some(user)) => {
                SubmissionMethod::TarCredentials { tar, user }
            }
            _ => {
                return Err(CoreError::InvalidSubmission(
                    echidna_core::domain::submission::MISSING_PARAMETERS.to_string(),
                ));
            }
        };

        Ok(Submission {
            method,
            decision: decision.unwrap_or_default(),
            dry_run: form.is_dry_run(),
            cc: SubmissionForm::non_empty(&form.cc).map(String::from),
            origin,
        })
    }
}

/// Handle on a pipeline started by [`RequestService::submit`]
#[derive(Debug)]
pub struct Accepted {
    pub id: Uuid,
    pub handle: JoinHandle<()>,
}

/// Publication request service
pub struct RequestService {
    config: Arc<Config>,
    registry: Arc<RequestRegistry>,
    steps: Arc<StepRegistry>,
    notifier: Arc<dyn Notifier>,
    shutdown: CancellationToken,
    pipelines: TaskTracker,
}

impl RequestService {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<RequestRegistry>,
        steps: Arc<StepRegistry>,
        notifier: Arc<dyn Notifier>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            registry,
            steps,
            notifier,
            shutdown,
            pipelines: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &RequestRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stops accepting pipelines and waits for the running ones
    ///
    /// Pipelines see the cancelled shutdown token, record the abort and
    /// persist their result. Returns `false` if some were still running
    /// after `grace`.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.shutdown.cancel();
        self.pipelines.close();

        info!("Waiting for {} running pipeline(s)", self.pipelines.len());
        tokio::time::timeout(grace, self.pipelines.wait())
            .await
            .is_ok()
    }

    /// Registers a request and starts its pipeline
    ///
    /// Returns as soon as the initial snapshot is visible in the registry;
    /// the pipeline keeps running in the background.
    pub async fn submit(&self, submission: Submission) -> Result<Accepted, SubmitError> {
        if self.pipelines.is_closed() {
            return Err(SubmitError::ShuttingDown);
        }

        let id = Uuid::new_v4();
        let kind = submission.method.kind();
        let temp_location = upload_repository::request_dir(&self.config.temp_location, id);
        let http_location = format!(
            "{}/{}/Overview.html",
            self.config.http_location.trim_end_matches('/'),
            id
        );

        let (source, tar_path, token, user) = match submission.method {
            SubmissionMethod::UrlToken { url, token } => {
                (DocumentSource::Url(url), None, Some(token), None)
            }
            SubmissionMethod::TarToken { tar, token } => {
                let path = upload_repository::stage_tar(
                    &self.config.temp_location,
                    id,
                    &tar.file_name,
                    &tar.bytes,
                )
                .await?;
                (DocumentSource::Tar(tar.file_name), Some(path), Some(token), None)
            }
            SubmissionMethod::TarCredentials { tar, user } => {
                let path = upload_repository::stage_tar(
                    &self.config.temp_location,
                    id,
                    &tar.file_name,
                    &tar.bytes,
                )
                .await?;
                (DocumentSource::Tar(tar.file_name), Some(path), None, Some(user))
            }
        };

        let jobs = job_list(kind, submission.dry_run);
        let record = RequestRecord {
            id,
            source: source.clone(),
            version: VERSION.to_string(),
            version_specberus: self.config.specberus_version.clone(),
            decision: submission.decision.clone(),
            results: RequestState::new(&jobs),
        };
        self.registry.insert(record.clone());

        let context = StepContext {
            id,
            source,
            tar_path,
            token,
            user,
            decision: submission.decision,
            temp_location,
            http_location,
            result_location: self.config.result_location.clone(),
            origin: submission.origin,
        };

        info!(
            "Request {} accepted ({:?}, {} job(s){})",
            id,
            kind,
            jobs.len(),
            if submission.dry_run { ", dry run" } else { "" }
        );

        let orchestrator = Orchestrator::new(
            Arc::clone(&self.steps),
            context,
            self.shutdown.child_token(),
            self.config.pipeline_timeout,
        );

        let handle = self.pipelines.spawn(run_pipeline(
            orchestrator,
            record,
            Arc::clone(&self.registry),
            Arc::clone(&self.notifier),
            self.config.result_location.clone(),
            submission.dry_run,
            submission.cc,
        ));

        Ok(Accepted { id, handle })
    }
}

/// Runs a pipeline, persists its record and sends the notification
async fn run_pipeline(
    orchestrator: Orchestrator,
    record: RequestRecord,
    registry: Arc<RequestRegistry>,
    notifier: Arc<dyn Notifier>,
    result_location: std::path::PathBuf,
    dry_run: bool,
    cc: Option<String>,
) {
    let id = record.id;
    let subject = record.source.subject().to_string();

    let outcome = orchestrator
        .run(record.results.clone(), |state| {
            registry.update(id, state);
        })
        .await;

    let (state, faulted) = match outcome {
        Ok(state) => {
            info!(
                "[{}] {}",
                state.status().to_string().to_uppercase(),
                subject
            );
            (state, false)
        }
        Err(e) => {
            error!("Request {} aborted: {}", id, e);
            let last = registry
                .get(id)
                .map(|r| r.results.clone())
                .unwrap_or_else(|| record.results.clone());
            let aborted = last.abort(INTERNAL_ERROR, Utc::now());
            registry.update(id, &aborted);
            (aborted, true)
        }
    };

    let final_record = record.with_results(state.clone());
    match result_repository::save(&result_location, &final_record).await {
        Ok(path) => {
            debug!("Result of request {} written to {}", id, path.display());
            registry.mark_persisted(id);
        }
        Err(e) => {
            // the entry still expires; status is served from memory until then
            error!("Failed to persist result of request {}: {}", id, e);
            registry.mark_persisted(id);
        }
    }

    if faulted {
        return;
    }

    if dry_run {
        info!("Dry-run: omitting e-mail notification");
    } else if let Err(e) = notifier
        .send(id, &state, &final_record, &subject, cc.as_deref())
        .await
    {
        error!("Failed to send notification for request {}: {:#}", id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::orchestrator::tests::scripted_registry;
    use crate::steps::StepOutcome;
    use async_trait::async_trait;
    use echidna_core::domain::job::{JobName, JobStatus};
    use echidna_core::domain::state::RequestStatus;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(Uuid, RequestStatus, String, Option<String>)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(
            &self,
            id: Uuid,
            state: &RequestState,
            _record: &RequestRecord,
            subject: &str,
            cc: Option<&str>,
        ) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push((
                id,
                state.status(),
                subject.to_string(),
                cc.map(String::from),
            ));
            Ok(())
        }
    }

    struct Harness {
        service: RequestService,
        notifier: Arc<RecordingNotifier>,
        _dir: tempfile::TempDir,
    }

    fn harness(overrides: HashMap<JobName, Result<StepOutcome, String>>) -> Harness {
        harness_with(overrides, Duration::ZERO, |_| {})
    }

    fn harness_with(
        overrides: HashMap<JobName, Result<StepOutcome, String>>,
        delay: Duration,
        configure: impl FnOnce(&mut Config),
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            temp_location: dir.path().join("tmp"),
            result_location: dir.path().join("results"),
            ..Config::default()
        };
        configure(&mut config);
        let (steps, _log) = scripted_registry(overrides, delay);
        let notifier = Arc::new(RecordingNotifier::default());
        let service = RequestService::new(
            Arc::new(config),
            Arc::new(RequestRegistry::new(Duration::from_secs(60))),
            Arc::new(steps),
            notifier.clone(),
            CancellationToken::new(),
        );
        Harness {
            service,
            notifier,
            _dir: dir,
        }
    }

    fn url_submission() -> Submission {
        Submission {
            method: SubmissionMethod::UrlToken {
                url: "https://example.org/doc".to_string(),
                token: "t".to_string(),
            },
            decision: "d".to_string(),
            dry_run: false,
            cc: None,
            origin: None,
        }
    }

    fn tar() -> TarUpload {
        TarUpload {
            file_name: "spec.tar".to_string(),
            bytes: Bytes::from_static(b"archive"),
        }
    }

    async fn persisted(service: &RequestService, id: Uuid) -> RequestRecord {
        let bytes = result_repository::load(&service.config().result_location, id)
            .await
            .unwrap()
            .expect("result file written");
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_from_parts_url_token() {
        let form = SubmissionForm {
            url: Some("https://example.org/doc".to_string()),
            token: Some("t".to_string()),
            decision: Some("d".to_string()),
            dry_run: Some("TRUE".to_string()),
            cc: Some("".to_string()),
        };
        let submission = Submission::from_parts(form, None, None, None).unwrap();
        assert_eq!(submission.method.kind(), SubmissionKind::UrlToken);
        assert!(submission.dry_run);
        assert_eq!(submission.cc, None);
    }

    #[test]
    fn test_from_parts_rejects_missing_decision() {
        let form = SubmissionForm {
            token: Some("t".to_string()),
            ..SubmissionForm::default()
        };
        let err = Submission::from_parts(form, Some(tar()), None, None).unwrap_err();
        assert!(err.to_string().contains("Missing required parameters"));
    }

    #[test]
    fn test_from_parts_tar_credentials() {
        let form = SubmissionForm {
            decision: Some("d".to_string()),
            ..SubmissionForm::default()
        };
        let submission =
            Submission::from_parts(form, Some(tar()), Some("alice".to_string()), None).unwrap();
        assert_eq!(submission.method.kind(), SubmissionKind::TarCredentials);
    }

    #[tokio::test]
    async fn test_url_token_all_steps_succeed() {
        let h = harness(HashMap::new());
        let submission = Submission {
            method: SubmissionMethod::UrlToken {
                url: "https://example.org/doc".to_string(),
                token: "t".to_string(),
            },
            decision: "https://lists.w3.org/decision".to_string(),
            dry_run: false,
            cc: Some("editor@example.org".to_string()),
            origin: None,
        };

        let accepted = h.service.submit(submission).await.unwrap();
        accepted.handle.await.unwrap();

        let record = persisted(&h.service, accepted.id).await;
        assert_eq!(record.results.status(), RequestStatus::Success);
        assert_eq!(
            record.results.names(),
            job_list(SubmissionKind::UrlToken, false)
        );
        assert!(
            record
                .results
                .jobs()
                .all(|(_, job)| job.status == JobStatus::Success)
        );

        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, accepted.id);
        assert_eq!(sent[0].1, RequestStatus::Success);
        assert_eq!(sent[0].2, "https://example.org/doc");
        assert_eq!(sent[0].3.as_deref(), Some("editor@example.org"));
    }

    #[tokio::test]
    async fn test_tar_token_specberus_failure() {
        let h = harness(HashMap::from([(
            JobName::Specberus,
            Ok(StepOutcome::failure(vec!["No status section".to_string()])),
        )]));
        let submission = Submission {
            method: SubmissionMethod::TarToken {
                tar: tar(),
                token: "t".to_string(),
            },
            decision: "d".to_string(),
            dry_run: false,
            cc: None,
            origin: None,
        };

        let accepted = h.service.submit(submission).await.unwrap();
        accepted.handle.await.unwrap();

        let record = persisted(&h.service, accepted.id).await;
        assert_eq!(record.source, DocumentSource::Tar("spec.tar".to_string()));
        assert_eq!(record.results.status(), RequestStatus::Failure);
        for name in [
            JobName::TokenChecker,
            JobName::TransitionChecker,
            JobName::ThirdPartyChecker,
            JobName::Publish,
            JobName::TrInstall,
            JobName::UpdateTrShortlink,
        ] {
            assert_eq!(record.results.get(name).unwrap().status, JobStatus::Pending);
        }

        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, RequestStatus::Failure);
    }

    #[tokio::test]
    async fn test_tar_credentials_dry_run() {
        let h = harness(HashMap::new());
        let submission = Submission {
            method: SubmissionMethod::TarCredentials {
                tar: tar(),
                user: "alice".to_string(),
            },
            decision: "d".to_string(),
            dry_run: true,
            cc: None,
            origin: None,
        };

        let accepted = h.service.submit(submission).await.unwrap();
        accepted.handle.await.unwrap();

        let record = persisted(&h.service, accepted.id).await;
        assert_eq!(record.results.status(), RequestStatus::Success);
        for name in [JobName::Publish, JobName::TrInstall, JobName::UpdateTrShortlink] {
            assert!(record.results.get(name).is_none());
        }
        assert!(h.notifier.sent.lock().unwrap().is_empty());

        // the archive was staged for the steps
        let staged = h
            .service
            .config()
            .temp_location
            .join(accepted.id.to_string())
            .join("spec.tar");
        assert_eq!(std::fs::read(staged).unwrap(), b"archive");
    }

    #[tokio::test]
    async fn test_fault_marks_request_failed() {
        let h = harness(HashMap::from([(
            JobName::Metadata,
            Err("connection refused".to_string()),
        )]));
        let submission = Submission {
            method: SubmissionMethod::UrlToken {
                url: "https://example.org/doc".to_string(),
                token: "t".to_string(),
            },
            decision: "d".to_string(),
            dry_run: false,
            cc: None,
            origin: None,
        };

        let accepted = h.service.submit(submission).await.unwrap();
        accepted.handle.await.unwrap();

        let in_memory = h.service.registry().get(accepted.id).unwrap();
        assert_eq!(in_memory.results.status(), RequestStatus::Failure);
        let metadata = in_memory.results.get(JobName::Metadata).unwrap();
        assert_eq!(metadata.status, JobStatus::Failure);
        assert_eq!(metadata.errors, vec![INTERNAL_ERROR.to_string()]);

        let record = persisted(&h.service, accepted.id).await;
        assert_eq!(record.results.status(), RequestStatus::Failure);
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_initial_snapshot_visible_after_submit() {
        let h = harness(HashMap::new());
        let submission = Submission {
            method: SubmissionMethod::UrlToken {
                url: "https://example.org/doc".to_string(),
                token: "t".to_string(),
            },
            decision: "d".to_string(),
            dry_run: false,
            cc: None,
            origin: None,
        };

        let accepted = h.service.submit(submission).await.unwrap();
        let snapshot = h.service.registry().get(accepted.id).unwrap();
        assert_eq!(
            snapshot.results.names(),
            job_list(SubmissionKind::UrlToken, false)
        );
        accepted.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_persists_running_pipeline() {
        let h = harness_with(HashMap::new(), Duration::from_secs(30), |_| {});

        let accepted = h.service.submit(url_submission()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(h.service.shutdown(Duration::from_secs(5)).await);
        accepted.handle.await.unwrap();

        let record = persisted(&h.service, accepted.id).await;
        assert_eq!(record.results.status(), RequestStatus::Failure);
        assert!(
            record
                .results
                .jobs()
                .any(|(_, job)| job.errors == vec![INTERNAL_ERROR.to_string()])
        );

        let err = h.service.submit(url_submission()).await.unwrap_err();
        assert!(matches!(err, SubmitError::ShuttingDown));
    }

    #[tokio::test]
    async fn test_unsaved_result_still_expires() {
        let h = harness_with(HashMap::new(), Duration::ZERO, |config| {
            // a regular file where the result directory should be
            config.result_location = config.temp_location.with_file_name("results.txt");
        });
        std::fs::write(&h.service.config().result_location, b"not a directory").unwrap();

        let accepted = h.service.submit(url_submission()).await.unwrap();
        accepted.handle.await.unwrap();

        let registry = h.service.registry();
        assert_eq!(
            registry.get(accepted.id).unwrap().results.status(),
            RequestStatus::Success
        );
        assert_eq!(registry.evict_expired(Instant::now()), 0);
        assert_eq!(
            registry.evict_expired(Instant::now() + Duration::from_secs(61)),
            1
        );
        assert!(registry.get(accepted.id).is_none());
    }
}
