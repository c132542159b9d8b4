//! HTTP fetch primitive for thread pages.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use super::{parse_page, FetchError, Page, PageFetcher};
use crate::constants::BROWSER_USER_AGENT;
use crate::retry::{retry, RetryPolicy};

/// Fetches thread pages over HTTP, classifying failures and retrying transient ones.
#[derive(Debug, Clone)]
pub struct ForumClient {
    client: Client,
    retry_policy: RetryPolicy,
}

impl ForumClient {
    /// Create a new forum client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration, retry_policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            retry_policy,
        })
    }

    async fn fetch_once(&self, page_url: &str) -> Result<Page, FetchError> {
        info!(method = "GET", url = %page_url, "HTTP request starting");

        let start = Instant::now();
        let response = self
            .client
            .get(page_url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Cache-Control", "max-age=0")
            .send()
            .await
            .map_err(|e| {
                warn!(url = %page_url, duration_ms = elapsed_ms(start), error = %e, "HTTP request failed");
                FetchError::Transient {
                    url: page_url.to_string(),
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        info!(
            url = %page_url,
            status_code = status.as_u16(),
            duration_ms = elapsed_ms(start),
            "HTTP request completed"
        );

        if let Some(err) = classify_status(status, page_url) {
            return Err(err);
        }

        let body = response.text().await.map_err(|e| FetchError::Transient {
            url: page_url.to_string(),
            message: format!("failed to read body: {e}"),
        })?;

        let page = parse_page(&body, page_url)?;
        debug!(
            url = %page_url,
            title = %page.title,
            current_page = page.current_page,
            last_page = page.last_page,
            posts_found = page.posts.len(),
            "Thread page parsed"
        );
        Ok(page)
    }
}

#[async_trait]
impl PageFetcher for ForumClient {
    async fn fetch_page(&self, page_url: &str) -> Result<Page, FetchError> {
        retry(
            &self.retry_policy,
            "fetch_thread_page",
            || self.fetch_once(page_url),
            |e: &FetchError| e.kind().is_retryable(),
        )
        .await
    }
}

/// Map a non-success status to a classified error; `None` means carry on and parse.
fn classify_status(status: StatusCode, page_url: &str) -> Option<FetchError> {
    let url = page_url.to_string();
    match status {
        s if s.is_success() => None,
        StatusCode::FORBIDDEN => {
            warn!(url = %page_url, "HTTP 403 Forbidden - thread requires login");
            Some(FetchError::Forbidden { url })
        }
        StatusCode::NOT_FOUND | StatusCode::GONE => Some(FetchError::Permanent {
            url,
            message: format!("HTTP {}", status.as_u16()),
        }),
        _ => Some(FetchError::Transient {
            url,
            message: format!("HTTP {}", status.as_u16()),
        }),
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
