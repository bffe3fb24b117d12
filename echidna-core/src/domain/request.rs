//! Request record
//!
//! The top-level record of one publication request. This is what the status
//! endpoint returns while the request is in flight and what is written to
//! the result file once it finishes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::state::RequestState;

/// What was submitted for publication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSource {
    /// URL of a manifest or document
    Url(String),
    /// Original file name of an uploaded archive
    Tar(String),
}

impl DocumentSource {
    /// Identifier used in log lines and notification subjects
    pub fn subject(&self) -> &str {
        match self {
            DocumentSource::Url(url) => url,
            DocumentSource::Tar(name) => name,
        }
    }
}

/// Publication request record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub source: DocumentSource,
    pub version: String,
    #[serde(rename = "version-specberus")]
    pub version_specberus: String,
    pub decision: String,
    pub results: RequestState,
}

impl RequestRecord {
    /// Same record with a newer snapshot
    pub fn with_results(&self, results: RequestState) -> RequestRecord {
        RequestRecord {
            results,
            ..self.clone()
        }
    }
}
