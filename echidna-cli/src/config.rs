//! Configuration module
//!
//! Handles CLI configuration including the service URL.

use echidna_client::EchidnaClient;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the Echidna service
    pub echidna_url: String,
}

impl Config {
    pub fn client(&self) -> EchidnaClient {
        EchidnaClient::new(&self.echidna_url)
    }
}
