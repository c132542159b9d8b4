//! Domain types shared by the poller, the store and the emailer.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A single post fetched from a thread page.
///
/// Posts only live for the duration of a poll cycle; they are never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Unique within a thread.
    pub id: String,
    pub author: String,
    /// Plain text content, used as the email fallback.
    pub content: String,
    /// Rich HTML content, when the page provided it.
    pub html_content: Option<String>,
    /// Raw RFC 3339 timestamp as published by the forum.
    pub timestamp: Option<String>,
    /// Permalink to the post.
    pub url: String,
}

impl Post {
    /// Parse the post timestamp, if it is present and valid RFC 3339.
    #[must_use]
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// A watched thread, embedded in exactly one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    /// Canonical thread URL.
    #[serde(rename = "thread_url")]
    pub url: String,
    #[serde(rename = "thread_id")]
    pub id: String,
    /// Captured on the first successful fetch and never overwritten.
    #[serde(rename = "thread_title", default)]
    pub title: String,
    /// Last post the subscriber was notified about (or the baseline). Empty until the first check.
    #[serde(default)]
    pub last_post_id: String,
    #[serde(default, deserialize_with = "deserialize_time")]
    pub last_post_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_time")]
    pub last_polled_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_time")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Thread {
    /// A freshly subscribed thread that has never been polled.
    #[must_use]
    pub fn new(url: impl Into<String>, id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            id: id.into(),
            title: String::new(),
            last_post_id: String::new(),
            last_post_time: None,
            last_polled_at: None,
            created_at: Some(created_at),
        }
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.last_polled_at.is_none()
    }
}

/// One subscriber and every thread they watch. This is the unit of persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub email: String,
    /// Secret used by the unsubscribe/manage links, independent of the email.
    pub token: String,
    /// Thread id -> thread.
    #[serde(default)]
    pub threads: BTreeMap<String, Thread>,
}

impl Subscription {
    #[must_use]
    pub fn new(email: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            token: token.into(),
            threads: BTreeMap::new(),
        }
    }

    /// Add a thread keyed by its id, replacing any previous entry.
    pub fn watch(&mut self, thread: Thread) {
        self.threads.insert(thread.id.clone(), thread);
    }
}

/// Older documents encode "never" as the zero time `0001-01-01T00:00:00Z`.
fn deserialize_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<DateTime<Utc>> = Option::deserialize(deserializer)?;
    Ok(value.filter(|dt| dt.year() > 1))
}
