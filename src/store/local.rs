use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{decode, encode, is_subscription_key, subscription_key, Store, StoreError};
use crate::models::Subscription;

/// Stores each subscription as a JSON file in a local directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Open (and create if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                context: format!("failed to create storage directory {}", dir.display()),
                source,
            })?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_document(&self, name: &str) -> Result<Subscription, StoreError> {
        let path = self.dir.join(name);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|source| StoreError::Io {
                context: format!("failed to read {}", path.display()),
                source,
            })?;
        decode(&data, name)
    }
}

#[async_trait]
impl Store for LocalStore {
    async fn list(&self) -> Result<Vec<Subscription>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                context: format!("failed to read storage directory {}", self.dir.display()),
                source,
            })?;

        let mut subs = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(StoreError::Io {
                        context: format!("failed to iterate {}", self.dir.display()),
                        source,
                    })
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_subscription_key(&name) {
                continue;
            }

            match self.read_document(&name).await {
                Ok(sub) => subs.push(sub),
                Err(e) => warn!(file = %name, error = %e, "Failed to load subscription"),
            }
        }

        debug!(count = subs.len(), dir = %self.dir.display(), "Listed subscriptions");
        Ok(subs)
    }

    async fn load(&self, token: &str) -> Result<Option<Subscription>, StoreError> {
        let key = subscription_key(token)?;
        match self.read_document(&key).await {
            Ok(sub) => Ok(Some(sub)),
            Err(StoreError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn save(&self, sub: &Subscription) -> Result<(), StoreError> {
        let key = subscription_key(&sub.token)?;
        let data = encode(sub, &key)?;

        // Write a sibling then rename so readers never see a partial document
        let path = self.dir.join(&key);
        let tmp = self.dir.join(format!("{key}.tmp"));
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|source| StoreError::Io {
                context: format!("failed to write {}", tmp.display()),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Io {
                context: format!("failed to replace {}", path.display()),
                source,
            })?;

        info!(
            path = %path.display(),
            email = %sub.email,
            thread_count = sub.threads.len(),
            "Subscription saved to local storage"
        );
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        let key = subscription_key(token)?;
        let path = self.dir.join(&key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "Subscription deleted from local storage");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Subscription already absent");
                Ok(())
            }
            Err(source) => Err(StoreError::Io {
                context: format!("failed to delete {}", path.display()),
                source,
            }),
        }
    }
}
