//! Orchestrator
//!
//! Drives one request through its job list. The pipeline is a small state
//! machine derived from the current snapshot:
//!
//! - `Pending`: no job has started yet
//! - `Running(i)`: job `i` is running, or is the next one to start
//! - `Succeeded`: every job is terminal and none failed
//! - `Failed`: a job failed; remaining jobs stay pending
//!
//! Each call to [`Orchestrator::next`] performs exactly one transition:
//! either a pending job is started, or the running job's executor is run and
//! the job is finished. Every intermediate snapshot is reported so that
//! pollers can follow the progress.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use echidna_core::CoreError;
use echidna_core::domain::job::JobStatus;
use echidna_core::domain::state::{RequestState, RequestStatus};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::steps::{StepContext, StepFault, StepRegistry};

/// Errors that stop a pipeline
///
/// A failed validation is not one of these: it is recorded on its job and
/// the pipeline ends normally with a `failure` status.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Step(#[from] StepFault),

    #[error("invalid job transition: {0}")]
    Transition(#[from] CoreError),

    #[error("pipeline cancelled")]
    Cancelled,

    #[error("pipeline timed out after {0:?}")]
    TimedOut(Duration),
}

/// Where a pipeline stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Pending,
    Running(usize),
    Succeeded,
    Failed,
}

impl PipelinePhase {
    /// Phase of a snapshot
    pub fn of(state: &RequestState) -> PipelinePhase {
        match state.status() {
            RequestStatus::Failure => PipelinePhase::Failed,
            RequestStatus::Success => PipelinePhase::Succeeded,
            RequestStatus::Running => match state.running_index() {
                Some(idx) => PipelinePhase::Running(idx),
                None => match state.next_pending() {
                    Some(0) | None => PipelinePhase::Pending,
                    Some(idx) => PipelinePhase::Running(idx),
                },
            },
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, PipelinePhase::Succeeded | PipelinePhase::Failed)
    }
}

/// Repeatedly applies `step` until `is_done` holds
///
/// `on_progress` sees the initial state and every state `step` produces.
/// The token is checked before each transition; a fault from `step` stops
/// the loop and is returned as is.
pub async fn iterate<S, F, Fut, D, P>(
    mut step: F,
    is_done: D,
    mut on_progress: P,
    initial: S,
    cancel: &CancellationToken,
) -> Result<S, PipelineError>
where
    F: FnMut(S) -> Fut,
    Fut: Future<Output = Result<S, PipelineError>>,
    D: Fn(&S) -> bool,
    P: FnMut(&S),
{
    let mut state = initial;
    on_progress(&state);

    while !is_done(&state) {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        state = step(state).await?;
        on_progress(&state);
    }

    Ok(state)
}

/// Runs the job list of one request
pub struct Orchestrator {
    steps: Arc<StepRegistry>,
    context: StepContext,
    cancel: CancellationToken,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        steps: Arc<StepRegistry>,
        context: StepContext,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> Self {
        Self {
            steps,
            context,
            cancel,
            timeout,
        }
    }

    pub fn context(&self) -> &StepContext {
        &self.context
    }

    /// Termination predicate: everything ran, or a job failed
    ///
    /// Stopping at the first failure keeps side-effecting steps such as
    /// `publish` from running after a failed check.
    pub fn has_finished(state: &RequestState) -> bool {
        PipelinePhase::of(state).is_done()
    }

    /// Performs one transition
    pub async fn next(&self, state: RequestState) -> Result<RequestState, PipelineError> {
        let idx = match PipelinePhase::of(&state) {
            PipelinePhase::Succeeded | PipelinePhase::Failed => return Ok(state),
            PipelinePhase::Pending => 0,
            PipelinePhase::Running(idx) => idx,
        };

        let Some((name, status)) = state.at(idx).map(|(name, job)| (name, job.status)) else {
            return Ok(state);
        };

        if status == JobStatus::Pending {
            debug!("Request {}: starting {}", self.context.id, name);
            return Ok(state.start(name, Utc::now())?);
        }

        let executor = self.steps.get(name)?;
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
            outcome = executor.execute(&self.context, &state) => outcome?,
        };

        if !outcome.status.is_terminal() {
            return Err(StepFault::InvalidOutcome {
                step: name,
                status: outcome.status,
            }
            .into());
        }

        match outcome.status {
            JobStatus::Failure => warn!(
                "Request {}: {} failed: {}",
                self.context.id,
                name,
                outcome.errors.join("; ")
            ),
            status => info!("Request {}: {} finished ({})", self.context.id, name, status),
        }

        Ok(state.finish(name, outcome.status, outcome.errors, Utc::now())?)
    }

    /// Runs the pipeline to completion
    ///
    /// # Arguments
    /// * `initial` - Snapshot with every job pending
    /// * `on_progress` - Called with every intermediate snapshot
    ///
    /// # Returns
    /// The final snapshot, or the fault that stopped the pipeline
    pub async fn run<P>(
        &self,
        initial: RequestState,
        on_progress: P,
    ) -> Result<RequestState, PipelineError>
    where
        P: FnMut(&RequestState),
    {
        let pipeline = iterate(
            move |state| self.next(state),
            Orchestrator::has_finished,
            on_progress,
            initial,
            &self.cancel,
        );

        match tokio::time::timeout(self.timeout, pipeline).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::TimedOut(self.timeout)),
        }
    }
}
