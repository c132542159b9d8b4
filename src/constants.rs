//! Shared constants used across the application.

/// User agent string used for forum page requests.
///
/// Forum front-ends tend to block obvious bots, so this matches a current desktop browser.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Prefix of every persisted subscription document.
pub const SUBSCRIPTION_KEY_PREFIX: &str = "sub-";

/// Suffix of every persisted subscription document.
pub const SUBSCRIPTION_KEY_SUFFIX: &str = ".json";

/// Fallback email subject when a thread title was never captured.
pub const DEFAULT_SUBJECT: &str = "Forum Thread Update";

/// Fallback thread title when a page carries none.
pub const DEFAULT_THREAD_TITLE: &str = "Forum Thread";

/// Default cap on posts included in one notification email.
pub const DEFAULT_MAX_POSTS_PER_EMAIL: usize = 10;

/// Most threads one subscriber may watch at once.
pub const MAX_THREADS_PER_SUBSCRIBER: usize = 20;
