//! Authentication service
//!
//! Verifies the HTTP basic credentials of tar submissions. Production
//! deployments back this with the directory service; the static
//! implementation reads its users from the configuration.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use subtle::ConstantTimeEq;

/// Service trait for credential verification
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns the user name when the credentials are valid
    async fn authenticate(&self, username: &str, password: &str) -> Option<String>;
}

/// Authenticator over a fixed set of users
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    users: HashMap<String, String>,
}

impl StaticAuthenticator {
    pub fn new(users: HashMap<String, String>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, username: &str, password: &str) -> Option<String> {
        let expected = self.users.get(username)?;
        let matches: bool = expected.as_bytes().ct_eq(password.as_bytes()).into();
        matches.then(|| username.to_string())
    }
}

/// Decode an `Authorization: Basic ...` header value
pub fn parse_basic(header: &str) -> Option<(String, String)> {
    let encoded = header
        .strip_prefix("Basic ")
        .or_else(|| header.strip_prefix("basic "))?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let header = format!("Basic {}", STANDARD.encode("alice:s3cr:et"));
        assert_eq!(
            parse_basic(&header),
            Some(("alice".to_string(), "s3cr:et".to_string()))
        );
        assert_eq!(parse_basic("Bearer abc"), None);
        assert_eq!(parse_basic("Basic !!!"), None);
    }

    #[tokio::test]
    async fn test_static_authenticator() {
        let auth = StaticAuthenticator::new(HashMap::from([(
            "alice".to_string(),
            "secret".to_string(),
        )]));

        assert_eq!(
            auth.authenticate("alice", "secret").await,
            Some("alice".to_string())
        );
        assert_eq!(auth.authenticate("alice", "wrong").await, None);
        assert_eq!(auth.authenticate("bob", "secret").await, None);
    }
}
