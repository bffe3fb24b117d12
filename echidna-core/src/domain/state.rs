//! Request snapshot types
//!
//! A [`RequestState`] is the ordered list of jobs of one request together
//! with the overall status derived from them. It is never mutated: every
//! transition returns a new snapshot, so a reader holding one always sees a
//! consistent picture.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::job::{Job, JobName, JobStatus};
use crate::error::CoreError;

/// Overall status of a request, derived from its jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Running,
    Success,
    Failure,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Running)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestStatus::Running => "running",
            RequestStatus::Success => "success",
            RequestStatus::Failure => "failure",
        })
    }
}

/// Immutable snapshot of every job of a request
///
/// Job order is fixed when the snapshot is built and is never changed by a
/// transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestState {
    jobs: Vec<(JobName, Job)>,
}

impl RequestState {
    /// Build a snapshot with every job pending, in the given order
    pub fn new(names: &[JobName]) -> Self {
        Self {
            jobs: names.iter().map(|name| (*name, Job::pending())).collect(),
        }
    }

    /// Jobs in pipeline order
    pub fn jobs(&self) -> impl Iterator<Item = (JobName, &Job)> {
        self.jobs.iter().map(|(name, job)| (*name, job))
    }

    pub fn names(&self) -> Vec<JobName> {
        self.jobs.iter().map(|(name, _)| *name).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, name: JobName) -> Option<&Job> {
        self.position(name).map(|idx| &self.jobs[idx].1)
    }

    /// Job at a given pipeline position
    pub fn at(&self, index: usize) -> Option<(JobName, &Job)> {
        self.jobs.get(index).map(|(name, job)| (*name, job))
    }

    pub fn position(&self, name: JobName) -> Option<usize> {
        self.jobs.iter().position(|(n, _)| *n == name)
    }

    /// Overall status
    ///
    /// `failure` as soon as one job failed, `running` while any job is
    /// pending or running, `success` once all jobs are terminal.
    pub fn status(&self) -> RequestStatus {
        if self.has_failure() {
            RequestStatus::Failure
        } else if self.jobs.iter().any(|(_, job)| !job.status.is_terminal()) {
            RequestStatus::Running
        } else {
            RequestStatus::Success
        }
    }

    pub fn has_failure(&self) -> bool {
        self.jobs
            .iter()
            .any(|(_, job)| job.status == JobStatus::Failure)
    }

    /// Index of the job currently running, if any
    pub fn running_index(&self) -> Option<usize> {
        self.jobs
            .iter()
            .position(|(_, job)| job.status == JobStatus::Running)
    }

    /// Index of the first job still pending, if any
    pub fn next_pending(&self) -> Option<usize> {
        self.jobs
            .iter()
            .position(|(_, job)| job.status == JobStatus::Pending)
    }

    /// New snapshot with one job moved to running
    pub fn start(&self, name: JobName, at: DateTime<Utc>) -> Result<RequestState, CoreError> {
        let idx = self.position(name).ok_or(CoreError::UnknownJob(name))?;
        let job = self.jobs[idx].1.start(name, at)?;
        Ok(self.replace(idx, job))
    }

    /// New snapshot with one running job moved to a terminal status
    pub fn finish(
        &self,
        name: JobName,
        status: JobStatus,
        errors: Vec<String>,
        at: DateTime<Utc>,
    ) -> Result<RequestState, CoreError> {
        let idx = self.position(name).ok_or(CoreError::UnknownJob(name))?;
        let job = self.jobs[idx].1.finish(name, status, errors, at)?;
        Ok(self.replace(idx, job))
    }

    /// Force the current job into `failure` after a fault
    ///
    /// The running job is failed with `message`; when nothing is running the
    /// first pending job is started and failed instead, so that the overall
    /// status becomes `failure`. A snapshot that is already terminal is
    /// returned unchanged.
    pub fn abort(&self, message: &str, at: DateTime<Utc>) -> RequestState {
        if self.status().is_terminal() {
            return self.clone();
        }

        let idx = match self.running_index().or_else(|| self.next_pending()) {
            Some(idx) => idx,
            None => return self.clone(),
        };

        let (name, job) = &self.jobs[idx];
        let running = if job.status == JobStatus::Pending {
            job.start(*name, at)
        } else {
            Ok(job.clone())
        };

        match running.and_then(|job| job.finish(*name, JobStatus::Failure, vec![message.to_string()], at)) {
            Ok(failed) => self.replace(idx, failed),
            Err(_) => self.clone(),
        }
    }

    fn replace(&self, idx: usize, job: Job) -> RequestState {
        let mut jobs = self.jobs.clone();
        jobs[idx].1 = job;
        RequestState { jobs }
    }
}

// =============================================================================
// Serialization
// =============================================================================

// Jobs are written as a JSON object keyed by step name, in pipeline order.
// The overall status is written next to them but recomputed on read.

struct OrderedJobs<'a>(&'a [(JobName, Job)]);

impl Serialize for OrderedJobs<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, job) in self.0 {
            map.serialize_entry(name, job)?;
        }
        map.end()
    }
}

impl Serialize for RequestState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("jobs", &OrderedJobs(&self.jobs))?;
        map.serialize_entry("status", &self.status())?;
        map.end()
    }
}

struct JobsVisitor;

impl<'de> Visitor<'de> for JobsVisitor {
    type Value = Vec<(JobName, Job)>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of step names to jobs")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut jobs = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, job)) = access.next_entry::<JobName, Job>()? {
            jobs.push((name, job));
        }
        Ok(jobs)
    }
}

struct OrderedJobsOwned(Vec<(JobName, Job)>);

impl<'de> Deserialize<'de> for OrderedJobsOwned {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(JobsVisitor).map(OrderedJobsOwned)
    }
}

#[derive(Deserialize)]
struct RawRequestState {
    jobs: OrderedJobsOwned,
}

impl<'de> Deserialize<'de> for RequestState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawRequestState::deserialize(deserializer)?;
        Ok(RequestState { jobs: raw.jobs.0 })
    }
}
