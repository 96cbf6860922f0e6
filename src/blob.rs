//! Blob store collaborators.
//!
//! The engine needs exactly one thing from a blob store: stream the bytes
//! behind an opaque `storage_key` so the init node can spool them to
//! `source.pdf` in the request temp directory. Two implementations cover the
//! deployments we run: a filesystem root for local and air-gapped setups,
//! and an HTTP store for object-storage gateways. Anything fancier stays
//! behind the trait.

use std::path::PathBuf;

use async_trait::async_trait;
use futures::TryStreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::error::HeraldError;

/// Readable stream over a stored blob. Dropping the reader closes it.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Minimal blob-store contract consumed by the init node.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Open the blob under `key` for streaming.
    async fn download(&self, key: &str) -> Result<BlobReader, HeraldError>;
}

// ── Filesystem store ─────────────────────────────────────────────────────

/// Blob store rooted at a directory; keys are root-relative paths.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn download(&self, key: &str) -> Result<BlobReader, HeraldError> {
        let path = self.root.join(key);
        debug!(key, path = %path.display(), "opening filesystem blob");
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(HeraldError::BlobNotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(HeraldError::BlobDownloadFailed {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

// ── HTTP store ───────────────────────────────────────────────────────────

/// Blob store backed by an HTTP object gateway; keys become URL path
/// segments under the base URL.
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    base_url: reqwest::Url,
    client: reqwest::Client,
}

impl HttpBlobStore {
    pub fn new(base_url: reqwest::Url) -> Result<Self, HeraldError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| HeraldError::Internal(format!("http client: {e}")))?;
        Ok(Self { base_url, client })
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn download(&self, key: &str) -> Result<BlobReader, HeraldError> {
        let url = self
            .base_url
            .join(key)
            .map_err(|e| HeraldError::BlobDownloadFailed {
                key: key.to_string(),
                reason: format!("invalid key: {e}"),
            })?;
        debug!(key, %url, "downloading blob");

        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|e| HeraldError::BlobDownloadFailed {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(HeraldError::BlobNotFound {
                key: key.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(HeraldError::BlobDownloadFailed {
                key: key.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::other(e.to_string()));
        Ok(Box::new(StreamReader::new(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn fs_store_streams_existing_blobs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("doc.pdf"), b"%PDF-1.7 fake").unwrap();

        let store = FsBlobStore::new(dir.path());
        let mut reader = store.download("doc.pdf").await.unwrap();
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.7 fake");
    }

    #[tokio::test]
    async fn fs_store_reports_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let err = store.download("nope.pdf").await.err().unwrap();
        assert!(matches!(err, HeraldError::BlobNotFound { ref key } if key == "nope.pdf"));
    }
}
