//! Thread URL handling.
//!
//! A thread can be reached through many URLs (`.../page-12`, `#post-123`,
//! tracking query strings). Subscriptions and the per-cycle fetch cache are
//! keyed by one canonical form so every subscriber of a thread shares a fetch.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static THREAD_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/threads/(?:([^/]+)\.)?(\d+)(?:/|$)").expect("thread path regex is valid")
});

/// Normalize a thread URL, stripping page numbers, query strings and anchors.
///
/// Returns `None` when the URL is not an http(s) URL pointing at a thread.
#[must_use]
pub fn canonical_thread_url(raw: &str) -> Option<String> {
    let (scheme, location) = split_thread_url(raw)?;
    Some(format!("{scheme}://{location}"))
}

/// Key under which every form of a thread URL is grouped, including its
/// `http` and `https` variants.
#[must_use]
pub fn thread_key(raw: &str) -> Option<String> {
    split_thread_url(raw).map(|(_, location)| location)
}

/// Scheme and `host[:port]/prefix/threads/<slug>.<id>/` of a thread URL.
fn split_thread_url(raw: &str) -> Option<(String, String)> {
    let parsed = Url::parse(raw.trim()).ok()?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    let host = parsed.host_str()?.to_lowercase();

    let path = parsed.path();
    let caps = THREAD_PATH.captures(path)?;
    let whole = caps.get(0)?;
    let prefix = &path[..whole.start()];
    let id = caps.get(2)?.as_str();
    let segment = match caps.get(1) {
        Some(slug) => format!("{}.{id}", slug.as_str()),
        None => id.to_string(),
    };

    let authority = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    };

    Some((
        parsed.scheme().to_string(),
        format!("{authority}{prefix}/threads/{segment}/"),
    ))
}

/// Extract the numeric thread id from a thread URL.
#[must_use]
pub fn thread_id(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    THREAD_PATH
        .captures(parsed.path())
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// URL of page `page` of a canonical thread URL. Page 1 is the thread URL itself.
#[must_use]
pub fn page_url(canonical: &str, page: u32) -> String {
    if page <= 1 {
        return canonical.to_string();
    }
    format!("{}/page-{page}", canonical.trim_end_matches('/'))
}
