//! Submission methods and the job list they produce

use serde::{Deserialize, Serialize};

use crate::domain::job::JobName;
use crate::error::CoreError;

/// Message returned when a submission matches no accepted method
pub const MISSING_PARAMETERS: &str = "Missing required parameters \"url + token + decision\", \
     \"tar + token + decision\" or \"tar + W3C credentials + decision\".";

/// How a document was submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionKind {
    UrlToken,
    TarToken,
    TarCredentials,
}

impl SubmissionKind {
    /// Classify a submission from the fields it carries
    ///
    /// Exactly one of `url`/`tar` must be present, with a token, or a tar
    /// with credentials. A decision is always required.
    pub fn resolve(
        has_url: bool,
        has_tar: bool,
        has_token: bool,
        has_credentials: bool,
        has_decision: bool,
    ) -> Result<SubmissionKind, CoreError> {
        if !has_decision {
            return Err(CoreError::InvalidSubmission(MISSING_PARAMETERS.to_string()));
        }

        match (has_url, has_tar, has_token, has_credentials) {
            (true, false, true, false) => Ok(SubmissionKind::UrlToken),
            (false, true, true, false) => Ok(SubmissionKind::TarToken),
            (false, true, false, true) => Ok(SubmissionKind::TarCredentials),
            _ => Err(CoreError::InvalidSubmission(MISSING_PARAMETERS.to_string())),
        }
    }

    pub fn uses_token(&self) -> bool {
        matches!(self, SubmissionKind::UrlToken | SubmissionKind::TarToken)
    }
}

// Token submissions are gated on the caller's origin and token before the
// transition rules run; credential submissions are gated on the user right
// after the metadata is known.
const TOKEN_SEQUENCE: [JobName; 10] = [
    JobName::IpChecker,
    JobName::RetrieveResources,
    JobName::Metadata,
    JobName::Specberus,
    JobName::TokenChecker,
    JobName::TransitionChecker,
    JobName::ThirdPartyChecker,
    JobName::Publish,
    JobName::TrInstall,
    JobName::UpdateTrShortlink,
];

const CREDENTIALS_SEQUENCE: [JobName; 9] = [
    JobName::RetrieveResources,
    JobName::Metadata,
    JobName::UserChecker,
    JobName::Specberus,
    JobName::TransitionChecker,
    JobName::ThirdPartyChecker,
    JobName::Publish,
    JobName::TrInstall,
    JobName::UpdateTrShortlink,
];

/// Ordered job list for a submission
///
/// A dry run stops right before `publish`.
pub fn job_list(kind: SubmissionKind, dry_run: bool) -> Vec<JobName> {
    let sequence: &[JobName] = match kind {
        SubmissionKind::UrlToken | SubmissionKind::TarToken => &TOKEN_SEQUENCE,
        SubmissionKind::TarCredentials => &CREDENTIALS_SEQUENCE,
    };

    if dry_run {
        sequence
            .iter()
            .copied()
            .take_while(|name| *name != JobName::Publish)
            .collect()
    } else {
        sequence.to_vec()
    }
}
