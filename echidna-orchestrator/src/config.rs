//! Orchestrator configuration
//!
//! Defines all configurable parameters for the orchestrator: where files go,
//! how long the IP check and pipelines may take, and how the external
//! collaborators are reached.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::steps::SourcePolicy;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// Where uploads and retrieved resources are staged, one directory per request
    pub temp_location: PathBuf,

    /// Public URL prefix under which staged documents are served
    pub http_location: String,

    /// Where result files (`<id>.json`) are written
    pub result_location: PathBuf,

    /// Version string of the conformance checker, reported by the API
    pub specberus_version: String,

    /// Token used to query the GitHub meta API
    pub gh_token: Option<String>,

    /// Base URL of the GitHub API
    pub gh_api_url: String,

    /// Host whose addresses are the Travis CI NAT egress
    pub travis_host: String,

    /// Upper bound for each allow-list source query
    pub source_timeout: Duration,

    /// What a failing allow-list source does to the IP check
    pub source_policy: SourcePolicy,

    /// Upper bound for a whole pipeline run
    pub pipeline_timeout: Duration,

    /// How long a finished request stays in memory after it was persisted
    pub registry_ttl: Duration,

    /// Base URL of the remote validator service running the delegated steps
    pub steps_url: Option<String>,

    /// Origins (regular expressions) allowed to call the API from a browser
    pub allowed_clients: Vec<String>,

    /// Static credentials accepted by the default authenticator
    pub users: HashMap<String, String>,

    /// Take the client address from `X-Forwarded-For`; only safe behind a
    /// proxy that overwrites the header
    pub trust_proxy: bool,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Every variable is optional:
    /// - ECHIDNA_BIND_ADDR (default: 0.0.0.0:3000)
    /// - ECHIDNA_TEMP_DIR (default: /tmp/echidna)
    /// - ECHIDNA_HTTP_LOCATION (default: http://localhost:3000/trs)
    /// - ECHIDNA_RESULT_DIR (default: /tmp/echidna-results)
    /// - ECHIDNA_SPECBERUS_VERSION
    /// - ECHIDNA_GH_TOKEN
    /// - ECHIDNA_GH_API_URL (default: https://api.github.com)
    /// - ECHIDNA_TRAVIS_HOST (default: nat.travisci.net)
    /// - ECHIDNA_SOURCE_TIMEOUT (seconds, default: 5)
    /// - ECHIDNA_SOURCE_POLICY (`exclude` or `fail-closed`, default: exclude)
    /// - ECHIDNA_PIPELINE_TIMEOUT (seconds, default: 1800)
    /// - ECHIDNA_REGISTRY_TTL (seconds, default: 600)
    /// - ECHIDNA_STEPS_URL
    /// - ECHIDNA_ALLOWED_CLIENTS (comma-separated regular expressions)
    /// - ECHIDNA_USERS (comma-separated `user:password` pairs)
    /// - ECHIDNA_TRUST_PROXY (`true` or `false`, default: false)
    ///
    /// A variable that is set but cannot be parsed is an error.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from any key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            bind_addr: lookup("ECHIDNA_BIND_ADDR").unwrap_or(defaults.bind_addr),
            temp_location: lookup("ECHIDNA_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_location),
            http_location: lookup("ECHIDNA_HTTP_LOCATION").unwrap_or(defaults.http_location),
            result_location: lookup("ECHIDNA_RESULT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.result_location),
            specberus_version: lookup("ECHIDNA_SPECBERUS_VERSION")
                .unwrap_or(defaults.specberus_version),
            gh_token: lookup("ECHIDNA_GH_TOKEN"),
            gh_api_url: lookup("ECHIDNA_GH_API_URL").unwrap_or(defaults.gh_api_url),
            travis_host: lookup("ECHIDNA_TRAVIS_HOST").unwrap_or(defaults.travis_host),
            source_timeout: parse_secs(&lookup, "ECHIDNA_SOURCE_TIMEOUT")?
                .unwrap_or(defaults.source_timeout),
            source_policy: parse_var(&lookup, "ECHIDNA_SOURCE_POLICY")?
                .unwrap_or(defaults.source_policy),
            pipeline_timeout: parse_secs(&lookup, "ECHIDNA_PIPELINE_TIMEOUT")?
                .unwrap_or(defaults.pipeline_timeout),
            registry_ttl: parse_secs(&lookup, "ECHIDNA_REGISTRY_TTL")?
                .unwrap_or(defaults.registry_ttl),
            steps_url: lookup("ECHIDNA_STEPS_URL"),
            allowed_clients: lookup("ECHIDNA_ALLOWED_CLIENTS")
                .map(|s| parse_list(&s))
                .unwrap_or_default(),
            users: lookup("ECHIDNA_USERS")
                .map(|s| parse_users(&s))
                .unwrap_or_default(),
            trust_proxy: parse_var(&lookup, "ECHIDNA_TRUST_PROXY")?
                .unwrap_or(defaults.trust_proxy),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.source_timeout.is_zero() {
            anyhow::bail!("source_timeout must be greater than 0");
        }

        if self.pipeline_timeout.is_zero() {
            anyhow::bail!("pipeline_timeout must be greater than 0");
        }

        if self.registry_ttl.is_zero() {
            anyhow::bail!("registry_ttl must be greater than 0");
        }

        if let Some(url) = &self.steps_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("steps_url must start with http:// or https://");
            }
        }

        for pattern in &self.allowed_clients {
            regex::Regex::new(pattern)
                .map_err(|e| anyhow::anyhow!("invalid allowed client '{}': {}", pattern, e))?;
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            temp_location: PathBuf::from("/tmp/echidna"),
            http_location: "http://localhost:3000/trs".to_string(),
            result_location: PathBuf::from("/tmp/echidna-results"),
            specberus_version: "unknown".to_string(),
            gh_token: None,
            gh_api_url: "https://api.github.com".to_string(),
            travis_host: "nat.travisci.net".to_string(),
            source_timeout: Duration::from_secs(5),
            source_policy: SourcePolicy::Exclude,
            pipeline_timeout: Duration::from_secs(30 * 60),
            registry_ttl: Duration::from_secs(600),
            steps_url: None,
            allowed_clients: Vec::new(),
            users: HashMap::new(),
            trust_proxy: false,
        }
    }
}

/// Parses a variable when it is set
fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("invalid {} '{}': {}", key, value, e))
        })
        .transpose()
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> anyhow::Result<Option<Duration>> {
    Ok(parse_var::<u64>(lookup, key)?.map(Duration::from_secs))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_users(value: &str) -> HashMap<String, String> {
    parse_list(value)
        .into_iter()
        .filter_map(|pair| {
            pair.split_once(':')
                .map(|(user, password)| (user.to_string(), password.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.source_timeout, Duration::from_secs(5));
        assert_eq!(config.source_policy, SourcePolicy::Exclude);
        assert_eq!(config.travis_host, "nat.travisci.net");
        assert!(!config.trust_proxy);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.source_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
        config.source_timeout = Duration::from_secs(1);

        config.steps_url = Some("not-a-url".to_string());
        assert!(config.validate().is_err());
        config.steps_url = Some("http://validator:9000".to_string());
        assert!(config.validate().is_ok());

        config.allowed_clients = vec!["(unclosed".to_string()];
        assert!(config.validate().is_err());
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_reads_every_setting() {
        let config = Config::from_lookup(lookup(&[
            ("ECHIDNA_RESULT_DIR", "/srv/results"),
            ("ECHIDNA_SOURCE_POLICY", "fail-closed"),
            ("ECHIDNA_PIPELINE_TIMEOUT", "60"),
            ("ECHIDNA_USERS", "alice:secret"),
            ("ECHIDNA_TRUST_PROXY", "true"),
        ]))
        .unwrap();

        assert_eq!(config.result_location, PathBuf::from("/srv/results"));
        assert_eq!(config.source_policy, SourcePolicy::FailClosed);
        assert_eq!(config.pipeline_timeout, Duration::from_secs(60));
        assert_eq!(config.users.len(), 1);
        assert!(config.trust_proxy);
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
    }

    #[test]
    fn test_from_lookup_rejects_invalid_values() {
        let err = Config::from_lookup(lookup(&[
            ("ECHIDNA_RESULT_DIR", "/srv/results"),
            ("ECHIDNA_SOURCE_POLICY", "fail-close"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("ECHIDNA_SOURCE_POLICY"));

        let err = Config::from_lookup(lookup(&[("ECHIDNA_REGISTRY_TTL", "ten")])).unwrap_err();
        assert!(err.to_string().contains("ECHIDNA_REGISTRY_TTL"));

        assert!(Config::from_lookup(lookup(&[("ECHIDNA_TRUST_PROXY", "yes")])).is_err());
    }

    #[test]
    fn test_parse_users() {
        let users = parse_users("alice:secret, bob:p:w ,broken");
        assert_eq!(users.get("alice"), Some(&"secret".to_string()));
        assert_eq!(users.get("bob"), Some(&"p:w".to_string()));
        assert_eq!(users.len(), 2);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list(r"^https://w3c\.github\.io$, ,^http://localhost"),
            vec![
                r"^https://w3c\.github\.io$".to_string(),
                "^http://localhost".to_string()
            ]
        );
    }
}
