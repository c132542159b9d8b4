use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use super::{EmailError, MailProvider};
use crate::retry::{retry, RetryPolicy};

/// Sends email through the Brevo transactional API.
pub struct BrevoProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from_address: String,
    from_name: String,
    retry_policy: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    sender: Contact<'a>,
    to: [Contact<'a>; 1],
    subject: &'a str,
    #[serde(rename = "htmlContent")]
    html_content: &'a str,
}

#[derive(Debug, Serialize)]
struct Contact<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

impl BrevoProvider {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        from_address: impl Into<String>,
        from_name: impl Into<String>,
        retry_policy: RetryPolicy,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build Brevo HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            from_address: from_address.into(),
            from_name: from_name.into(),
            retry_policy,
        })
    }

    async fn send_once(&self, to: &str, body: &[u8]) -> Result<(), EmailError> {
        let started = Instant::now();
        let response = self
            .client
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        let status = response.status();
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                status = status.as_u16(),
                to,
                duration_ms,
                "Brevo API returned non-success status"
            );
            return Err(EmailError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(to, duration_ms, "Brevo API request completed");
        Ok(())
    }
}

#[async_trait]
impl MailProvider for BrevoProvider {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), EmailError> {
        let request = SendRequest {
            sender: Contact {
                email: &self.from_address,
                name: Some(self.from_name.as_str()).filter(|n| !n.is_empty()),
            },
            to: [Contact {
                email: to,
                name: None,
            }],
            subject,
            html_content: html_body,
        };
        let body =
            serde_json::to_vec(&request).map_err(|e| EmailError::Request(e.to_string()))?;

        retry(
            &self.retry_policy,
            "brevo_send",
            || self.send_once(to, &body),
            |e: &EmailError| e.kind().is_retryable(),
        )
        .await
    }
}

impl std::fmt::Debug for BrevoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrevoProvider")
            .field("api_url", &self.api_url)
            .field("from_address", &self.from_address)
            .finish_non_exhaustive()
    }
}
