//! Allow-list sources
//!
//! Each source answers in its own shape (a JSON document, a DNS answer)
//! and normalizes it into a flat list of address ranges.

use std::net::IpAddr;

use async_trait::async_trait;
use ipnet::IpNet;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Errors raised while querying a source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("lookup failed: {0}")]
    Lookup(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

/// An external list of allowed addresses
#[async_trait]
pub trait AllowListSource: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Fetches the current list of allowed ranges
    async fn fetch(&self) -> Result<Vec<IpNet>, SourceError>;
}

/// Parse CIDR ranges or bare addresses, skipping anything else
pub fn parse_entries<'a>(entries: impl IntoIterator<Item = &'a str>) -> Vec<IpNet> {
    entries
        .into_iter()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            entry
                .parse::<IpNet>()
                .or_else(|_| entry.parse::<IpAddr>().map(IpNet::from))
                .map_err(|_| debug!("Ignoring allow-list entry '{}'", entry))
                .ok()
        })
        .collect()
}

// =============================================================================
// GitHub Actions
// =============================================================================

#[derive(Debug, Deserialize)]
struct MetaResponse {
    #[serde(default)]
    actions: Vec<String>,
}

/// GitHub Actions runner ranges, from `GET /meta`
pub struct GithubMetaSource {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GithubMetaSource {
    pub fn new(client: reqwest::Client, api_url: impl Into<String>, token: Option<String>) -> Self {
        let api_url = api_url.into();
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        }
    }
}

#[async_trait]
impl AllowListSource for GithubMetaSource {
    fn name(&self) -> &str {
        "github-actions"
    }

    async fn fetch(&self) -> Result<Vec<IpNet>, SourceError> {
        let url = format!("{}/meta", self.api_url);
        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, "echidna")
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let meta: MetaResponse = response.json().await?;
        Ok(parse_entries(meta.actions.iter().map(String::as_str)))
    }
}

// =============================================================================
// Travis CI
// =============================================================================

/// Addresses a host name resolves to
///
/// Used for the Travis CI NAT host, which lists the egress addresses of its
/// build machines.
pub struct DnsSource {
    host: String,
}

impl DnsSource {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

#[async_trait]
impl AllowListSource for DnsSource {
    fn name(&self) -> &str {
        "travis-ci"
    }

    async fn fetch(&self) -> Result<Vec<IpNet>, SourceError> {
        let addrs = tokio::net::lookup_host((self.host.as_str(), 0)).await?;
        Ok(addrs.map(|addr| IpNet::from(addr.ip())).collect())
    }
}
