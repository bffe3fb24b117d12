//! IP allow-list check
//!
//! Token submissions are restricted to CI services. The check queries every
//! allow-list source concurrently, each under its own timeout, merges the
//! ranges that came back and tests the origin address against them.
//!
//! The check always resolves: a source that errors or times out is either
//! left out of the merge ([`SourcePolicy::Exclude`]) or makes the whole check
//! fail ([`SourcePolicy::FailClosed`]).

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use echidna_core::domain::state::RequestState;
use futures::future::join_all;
use ipnet::IpNet;
use tracing::{debug, info, warn};

use super::sources::{AllowListSource, SourceError};
use super::{StepContext, StepExecutor, StepFault, StepOutcome};

/// Error reported when the origin is not covered by any source
pub const TOKEN_METHOD_RESTRICTED: &str = "The token method is restricted to GitHub Actions and \
     Travis CI only. If you want to submit a request outside these tools, please use the tar method.";

/// What a failing source does to the check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePolicy {
    /// Leave the source out of the merge and log it
    Exclude,
    /// Reject the request
    FailClosed,
}

impl FromStr for SourcePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exclude" => Ok(SourcePolicy::Exclude),
            "fail-closed" => Ok(SourcePolicy::FailClosed),
            other => anyhow::bail!(
                "invalid source policy '{}', expected 'exclude' or 'fail-closed'",
                other
            ),
        }
    }
}

/// Fan-in allow-list checker
pub struct IpChecker {
    sources: Vec<Arc<dyn AllowListSource>>,
    source_timeout: Duration,
    policy: SourcePolicy,
}

impl IpChecker {
    pub fn new(
        sources: Vec<Arc<dyn AllowListSource>>,
        source_timeout: Duration,
        policy: SourcePolicy,
    ) -> Self {
        Self {
            sources,
            source_timeout,
            policy,
        }
    }

    /// Checks an address against every source
    ///
    /// # Returns
    /// The errors to report; empty when the address is allowed
    pub async fn check(&self, addr: IpAddr) -> Vec<String> {
        let queries = self.sources.iter().map(|source| async move {
            let result = match tokio::time::timeout(self.source_timeout, source.fetch()).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::TimedOut(self.source_timeout)),
            };
            (source.name().to_string(), result)
        });

        let mut allowed: Vec<IpNet> = Vec::new();
        let mut failed: Vec<String> = Vec::new();

        for (name, result) in join_all(queries).await {
            match result {
                Ok(ranges) => {
                    debug!("Allow-list source {} returned {} range(s)", name, ranges.len());
                    allowed.extend(ranges);
                }
                Err(e) => {
                    warn!("Allow-list source {} unavailable: {}", name, e);
                    failed.push(format!("{} ({})", name, e));
                }
            }
        }

        if self.policy == SourcePolicy::FailClosed && !failed.is_empty() {
            return vec![format!(
                "Unable to verify the origin of the request, allow-list unavailable: {}.",
                failed.join(", ")
            )];
        }

        let addr = canonical(addr);
        if allowed.iter().any(|net| net.contains(&addr)) {
            Vec::new()
        } else {
            info!("Origin {} is not in any allow-list", addr);
            vec![TOKEN_METHOD_RESTRICTED.to_string()]
        }
    }
}

/// IPv4 addresses reaching a dual-stack listener show up IPv4-mapped
fn canonical(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

#[async_trait]
impl StepExecutor for IpChecker {
    async fn execute(
        &self,
        ctx: &StepContext,
        _state: &RequestState,
    ) -> Result<StepOutcome, StepFault> {
        let Some(origin) = ctx.origin else {
            return Ok(StepOutcome::failure(vec![
                "Unable to determine the origin of the request.".to_string(),
            ]));
        };

        Ok(StepOutcome::from_errors(self.check(origin).await))
    }
}
