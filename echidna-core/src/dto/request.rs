//! Request DTOs
//!
//! Field names match the form fields of `POST /api/request`.

use serde::{Deserialize, Serialize};

/// Form fields of a publication request
///
/// Every field is optional on the wire; the orchestrator decides which
/// combination is acceptable. The `tar` file of a multipart submission is
/// carried separately.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionForm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(
        rename = "dry-run",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub dry_run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<String>,
}

impl SubmissionForm {
    /// `dry-run` counts only when it reads `true`, in any case
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
            .as_deref()
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }

    /// Non-empty value of a field, or `None`
    pub fn non_empty(value: &Option<String>) -> Option<&str> {
        value.as_deref().filter(|v| !v.trim().is_empty())
    }
}

/// Query of `GET /api/status`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusQuery {
    pub id: Option<String>,
}
