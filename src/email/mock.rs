use async_trait::async_trait;
use tracing::info;

use super::{EmailError, MailProvider};

/// Logs emails instead of sending them. Used for local development.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockProvider;

#[async_trait]
impl MailProvider for MockProvider {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), EmailError> {
        info!(to, subject, body_length = html_body.len(), "MOCK EMAIL");
        Ok(())
    }
}
