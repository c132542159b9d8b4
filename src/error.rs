//! Error classification shared by the collaborator error types.

use std::fmt;

/// Closed set of failure kinds that callers branch on.
///
/// Fetch, storage and email errors all map onto these so the retry combinator
/// and the poll cycle can decide what to do without inspecting error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failures and 5xx-class responses. Retried with backoff.
    Transient,
    /// Login-walled content. Never retried.
    Forbidden,
    /// The page loaded but contained no posts.
    Content,
    /// Anything that will not succeed by trying again.
    Permanent,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Forbidden => "forbidden",
            Self::Content => "content",
            Self::Permanent => "permanent",
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
