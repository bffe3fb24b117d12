//! Notification service
//!
//! Sends the terminal notification of a request. Mail formatting and
//! delivery are handled elsewhere; this service only defines the seam.

use async_trait::async_trait;
use echidna_core::domain::request::RequestRecord;
use echidna_core::domain::state::RequestState;
use tracing::info;
use uuid::Uuid;

/// Service trait for terminal notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Notifies that a request finished
    ///
    /// # Arguments
    /// * `id` - The request ID
    /// * `state` - Final snapshot
    /// * `record` - The full request record
    /// * `subject` - URL or archive name the request is about
    /// * `cc` - Optional extra recipient
    async fn send(
        &self,
        id: Uuid,
        state: &RequestState,
        record: &RequestRecord,
        subject: &str,
        cc: Option<&str>,
    ) -> anyhow::Result<()>;
}

/// Notifier that only logs
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(
        &self,
        id: Uuid,
        state: &RequestState,
        _record: &RequestRecord,
        subject: &str,
        cc: Option<&str>,
    ) -> anyhow::Result<()> {
        info!(
            "Notification for request {}: [{}] {}{}",
            id,
            state.status().to_string().to_uppercase(),
            subject,
            cc.map(|cc| format!(" (cc {})", cc)).unwrap_or_default()
        );
        Ok(())
    }
}
