use anyhow::{Context, Result};
use async_trait::async_trait;
use s3::creds::Credentials;
use s3::region::Region;
use s3::Bucket;
use tracing::{debug, info, warn};

use super::{decode, encode, is_subscription_key, subscription_key, Store, StoreError};
use crate::constants::SUBSCRIPTION_KEY_PREFIX;
use crate::models::Subscription;
use crate::retry::{retry, RetryPolicy};

/// Stores each subscription as a JSON object in an S3-compatible bucket.
pub struct S3Store {
    bucket: Box<Bucket>,
    prefix: String,
    retry_policy: RetryPolicy,
}

impl S3Store {
    /// Create a new S3-backed store.
    ///
    /// Credentials come from `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or the bucket handle cannot be created.
    pub fn new(
        bucket: &str,
        region: &str,
        endpoint: Option<&str>,
        prefix: &str,
        retry_policy: RetryPolicy,
    ) -> Result<Self> {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID").context("AWS_ACCESS_KEY_ID not set")?;
        let secret_key =
            std::env::var("AWS_SECRET_ACCESS_KEY").context("AWS_SECRET_ACCESS_KEY not set")?;

        let credentials = Credentials::new(Some(&access_key), Some(&secret_key), None, None, None)
            .context("Failed to create S3 credentials")?;

        let region = match endpoint {
            Some(endpoint) => Region::Custom {
                region: region.to_string(),
                endpoint: endpoint.to_string(),
            },
            None => region.parse().unwrap_or(Region::UsEast1),
        };

        let handle =
            Bucket::new(bucket, region, credentials).context("Failed to create S3 bucket")?;

        // Use path-style for custom endpoints (MinIO, R2, etc.)
        let handle = if endpoint.is_some() {
            handle.with_path_style()
        } else {
            handle
        };

        Ok(Self {
            bucket: handle,
            prefix: prefix.to_string(),
            retry_policy,
        })
    }

    fn object_key(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }

    async fn put_once(&self, object_key: &str, data: &[u8]) -> Result<(), StoreError> {
        let response = self
            .bucket
            .put_object_with_content_type(object_key, data, "application/json")
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        check_status(response.status_code(), object_key)
    }

    async fn get_once(&self, object_key: &str) -> Result<Subscription, StoreError> {
        self.get_if_present(object_key)
            .await?
            .ok_or_else(|| StoreError::Rejected {
                status: 404,
                key: object_key.to_string(),
            })
    }

    async fn get_if_present(&self, object_key: &str) -> Result<Option<Subscription>, StoreError> {
        let response = self
            .bucket
            .get_object(object_key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if response.status_code() == 404 {
            return Ok(None);
        }
        check_status(response.status_code(), object_key)?;
        decode(response.bytes(), object_key).map(Some)
    }

    async fn delete_once(&self, object_key: &str) -> Result<(), StoreError> {
        let response = self
            .bucket
            .delete_object(object_key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        match response.status_code() {
            404 => Ok(()),
            status => check_status(status, object_key),
        }
    }
}

#[async_trait]
impl Store for S3Store {
    async fn list(&self) -> Result<Vec<Subscription>, StoreError> {
        let listing_prefix = self.object_key(SUBSCRIPTION_KEY_PREFIX);
        let results = self
            .bucket
            .list(listing_prefix.clone(), None)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let keys: Vec<String> = results
            .into_iter()
            .flat_map(|result| result.contents)
            .map(|object| object.key)
            .filter(|key| {
                key.rsplit('/')
                    .next()
                    .is_some_and(is_subscription_key)
            })
            .collect();
        debug!(count = keys.len(), prefix = %listing_prefix, "Listed S3 objects");

        let mut subs = Vec::with_capacity(keys.len());
        for key in keys {
            let loaded = retry(
                &self.retry_policy,
                "load_subscription",
                || self.get_once(&key),
                |e: &StoreError| e.kind().is_retryable(),
            )
            .await;
            match loaded {
                Ok(sub) => subs.push(sub),
                Err(e) => warn!(key = %key, error = %e, "Failed to load subscription"),
            }
        }

        Ok(subs)
    }

    async fn load(&self, token: &str) -> Result<Option<Subscription>, StoreError> {
        let object_key = self.object_key(&subscription_key(token)?);
        retry(
            &self.retry_policy,
            "load_subscription",
            || self.get_if_present(&object_key),
            |e: &StoreError| e.kind().is_retryable(),
        )
        .await
    }

    async fn save(&self, sub: &Subscription) -> Result<(), StoreError> {
        let name = subscription_key(&sub.token)?;
        let data = encode(sub, &name)?;
        let object_key = self.object_key(&name);

        retry(
            &self.retry_policy,
            "save_subscription",
            || self.put_once(&object_key, &data),
            |e: &StoreError| e.kind().is_retryable(),
        )
        .await?;

        info!(
            key = %object_key,
            email = %sub.email,
            thread_count = sub.threads.len(),
            "Subscription saved"
        );
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        let object_key = self.object_key(&subscription_key(token)?);
        retry(
            &self.retry_policy,
            "delete_subscription",
            || self.delete_once(&object_key),
            |e: &StoreError| e.kind().is_retryable(),
        )
        .await?;

        info!(key = %object_key, "Subscription deleted");
        Ok(())
    }
}

fn check_status(status: u16, key: &str) -> Result<(), StoreError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(StoreError::Rejected {
            status,
            key: key.to_string(),
        })
    }
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("bucket", &self.bucket.name())
            .field("prefix", &self.prefix)
            .finish()
    }
}
