//! Echidna HTTP Client
//!
//! A simple, type-safe HTTP client for the Echidna publication API, used by
//! the CLI and by anything else that submits documents.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use echidna_client::EchidnaClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = EchidnaClient::new("http://localhost:3000");
//!
//!     let id = client
//!         .submit_url("https://example.org/doc/", "token", "https://lists.w3.org/decision", true, None)
//!         .await?;
//!
//!     let record = client
//!         .wait(id, Duration::from_secs(2), Duration::from_secs(300))
//!         .await?;
//!     println!("{}: {}", id, record.results.status());
//!     Ok(())
//! }
//! ```

pub mod error;
mod meta;
mod requests;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use requests::TarAuth;

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Echidna API
#[derive(Debug, Clone)]
pub struct EchidnaClient {
    /// Base URL of the service (e.g., "http://localhost:3000")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl EchidnaClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the service (e.g., "http://localhost:3000")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and turn an error status into [`ClientError`]
    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        self.check(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response with a plain-text body
    async fn handle_text_response(&self, response: reqwest::Response) -> Result<String> {
        Ok(self.check(response).await?.text().await?)
    }
}
