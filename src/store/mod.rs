//! Subscription persistence.
//!
//! Every subscriber is one document keyed by their token, so saving one
//! subscriber never touches another's record.

mod local;
mod s3;

pub use self::local::LocalStore;
pub use self::s3::S3Store;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::constants::{SUBSCRIPTION_KEY_PREFIX, SUBSCRIPTION_KEY_SUFFIX};
use crate::error::ErrorKind;
use crate::models::Subscription;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid subscription token format")]
    InvalidToken,
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode or decode subscription {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("storage backend rejected request with status {status}: {key}")]
    Rejected { status: u16, key: String },
}

impl StoreError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Backend(_) => ErrorKind::Transient,
            Self::Rejected { status, .. } if *status >= 500 || *status == 429 => {
                ErrorKind::Transient
            }
            Self::Rejected { status: 403, .. } => ErrorKind::Forbidden,
            _ => ErrorKind::Permanent,
        }
    }
}

/// Load-all and overwrite-one access to subscription documents.
#[async_trait]
pub trait Store: Send + Sync {
    /// Load every subscription. Unreadable documents are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing collection cannot be enumerated.
    async fn list(&self) -> Result<Vec<Subscription>, StoreError>;

    /// Load the subscription for `token`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed or the document cannot be read.
    async fn load(&self, token: &str) -> Result<Option<Subscription>, StoreError>;

    /// Atomically overwrite one subscriber's full document.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed or the write fails.
    async fn save(&self, sub: &Subscription) -> Result<(), StoreError>;

    /// Remove the subscription for `token`. Removing a missing subscription succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed or the delete fails.
    async fn delete(&self, token: &str) -> Result<(), StoreError>;
}

/// Derive the subscription token for `email`.
///
/// The token is an HMAC-SHA256 of the email keyed by `salt`, so it is stable
/// for one address but cannot be guessed without the salt.
#[must_use]
pub fn token_for_email(salt: &[u8], email: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(salt).expect("HMAC-SHA-256 accepts keys of any size");
    mac.update(email.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Document name for a subscription token.
///
/// Tokens are 64 lowercase hex characters; anything else is rejected so a
/// token can never be used to address a path outside the store.
///
/// # Errors
///
/// Returns [`StoreError::InvalidToken`] for malformed tokens.
pub fn subscription_key(token: &str) -> Result<String, StoreError> {
    let valid = token.len() == 64
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !valid {
        return Err(StoreError::InvalidToken);
    }
    Ok(format!(
        "{SUBSCRIPTION_KEY_PREFIX}{token}{SUBSCRIPTION_KEY_SUFFIX}"
    ))
}

/// Whether a document name looks like a subscription.
#[must_use]
pub fn is_subscription_key(name: &str) -> bool {
    name.starts_with(SUBSCRIPTION_KEY_PREFIX) && name.ends_with(SUBSCRIPTION_KEY_SUFFIX)
}

fn encode(sub: &Subscription, key: &str) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(sub).map_err(|source| StoreError::Serialization {
        key: key.to_string(),
        source,
    })
}

fn decode(data: &[u8], key: &str) -> Result<Subscription, StoreError> {
    serde_json::from_slice(data).map_err(|source| StoreError::Serialization {
        key: key.to_string(),
        source,
    })
}
