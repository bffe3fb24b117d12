//! Version endpoints

use crate::EchidnaClient;
use crate::error::Result;

impl EchidnaClient {
    /// Version of the Echidna service
    pub async fn version(&self) -> Result<String> {
        let response = self.client.get(self.url("/api/version")).send().await?;
        self.handle_text_response(response).await
    }

    /// Version of the conformance checker the service runs
    pub async fn specberus_version(&self) -> Result<String> {
        let response = self
            .client
            .get(self.url("/api/version-specberus"))
            .send()
            .await?;
        self.handle_text_response(response).await
    }
}
