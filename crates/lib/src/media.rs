//! # Media Cache
//!
//! A content-addressable on-disk cache for lesson videos and PDFs. Each asset is
//! stored under the MD5 digest of its URL, so repeated downloads of the same
//! course reuse what is already on disk.

use crate::errors::MediaError;
use crate::remote::RemoteApi;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Clone, Debug)]
pub struct MediaCache {
    dir: PathBuf,
    remote: Box<dyn RemoteApi>,
}

impl MediaCache {
    pub fn new(dir: impl Into<PathBuf>, remote: Box<dyn RemoteApi>) -> Self {
        Self {
            dir: dir.into(),
            remote,
        }
    }

    /// The file an asset is (or would be) cached at.
    pub fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{:x}", md5::compute(url.as_bytes())))
    }

    pub async fn contains(&self, url: &str) -> bool {
        tokio::fs::try_exists(self.path_for(url))
            .await
            .unwrap_or(false)
    }

    /// Downloads the asset unless it is already cached.
    pub async fn cache_url(&self, url: &str) -> Result<PathBuf, MediaError> {
        let path = self.path_for(url);
        if self.contains(url).await {
            debug!(url = %url, "Media already cached.");
            return Ok(path);
        }

        let bytes = self.remote.fetch_media(url).await?;
        tokio::fs::create_dir_all(&self.dir).await?;
        // A torn write must never look cached.
        let partial = path.with_extension("partial");
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, &path).await?;
        info!(url = %url, bytes = bytes.len(), "Cached media asset.");
        Ok(path)
    }

    /// Deletes every cached asset.
    pub async fn clear(&self) -> Result<(), MediaError> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
