//! Forum access: URL canonicalization, page parsing and the HTTP fetch primitive.

pub mod client;
pub mod page;
pub mod url;

pub use client::ForumClient;
pub use page::parse_page;
pub use url::{canonical_thread_url, page_url, thread_id, thread_key};

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ErrorKind;
use crate::models::Post;

/// One parsed thread page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Posts in page order, oldest first.
    pub posts: Vec<Post>,
    pub title: String,
    /// 1-based number of this page.
    pub current_page: u32,
    /// Highest page number in the pagination bar, 0 for single-page threads.
    pub last_page: u32,
}

impl Page {
    /// Whether there is nothing beyond this page.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.last_page <= 1 || self.current_page >= self.last_page
    }
}

/// Classified failure of a single page fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("transient failure fetching {url}: {message}")]
    Transient { url: String, message: String },
    #[error("HTTP 403 Forbidden (login required): {url}")]
    Forbidden { url: String },
    #[error("no posts found at {url}")]
    Content { url: String },
    #[error("permanent failure fetching {url}: {message}")]
    Permanent { url: String, message: String },
}

impl FetchError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Content { .. } => ErrorKind::Content,
            Self::Permanent { .. } => ErrorKind::Permanent,
        }
    }

    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        self.kind() == ErrorKind::Forbidden
    }

    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Transient { url, .. }
            | Self::Forbidden { url }
            | Self::Content { url }
            | Self::Permanent { url, .. } => url,
        }
    }
}

/// Fetches and parses a single thread page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `page_url` and return its posts and pagination metadata.
    ///
    /// # Errors
    ///
    /// Returns a classified [`FetchError`].
    async fn fetch_page(&self, page_url: &str) -> Result<Page, FetchError>;
}
