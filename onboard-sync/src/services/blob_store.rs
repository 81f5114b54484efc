//! Blob store clients
//!
//! Document bytes go to an object store; the application only keeps the public
//! URL. `HttpBlobStore` talks to a storage-REST service (bucket/object paths,
//! bearer service key). `FsBlobStore` writes under a local directory for
//! single-machine deployments and tests.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Blob store errors
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Storage API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid object path: {0}")]
    InvalidPath(String),
}

/// Object storage used by the upload coordinator
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path`, overwriting any existing object
    async fn put(&self, path: &str, bytes: &[u8], content_type: Option<&str>)
        -> Result<(), BlobError>;

    /// Publicly resolvable URL of the object at `path`
    async fn public_url(&self, path: &str) -> Result<String, BlobError>;

    /// Delete every object whose path starts with `prefix`; returns the count
    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize, BlobError>;

    /// Object path behind a URL previously returned by `public_url`
    fn object_path(&self, url: &str) -> Option<String>;
}

// ============================================================================
// HTTP storage service
// ============================================================================

/// Storage-REST blob store
///
/// - upload: `POST {base}/object/{bucket}/{path}` (`x-upsert: true`)
/// - public URL: `{base}/object/public/{bucket}/{path}`
/// - list: `POST {base}/object/list/{bucket}` with `{"prefix": ...}`
/// - delete: `DELETE {base}/object/{bucket}` with `{"prefixes": [...]}`
pub struct HttpBlobStore {
    client: Client,
    base_url: String,
    bucket: String,
    service_key: String,
}

#[derive(Debug, Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: u32,
    offset: u32,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
}

impl HttpBlobStore {
    pub fn new(
        base_url: &str,
        bucket: &str,
        service_key: &str,
        timeout: Duration,
    ) -> Result<Self, BlobError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| BlobError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            service_key: service_key.to_string(),
        })
    }

    fn public_prefix(&self) -> String {
        format!("{}/object/public/{}/", self.base_url, self.bucket)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, BlobError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BlobError::ApiError(status.as_u16(), body))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        // The list endpoint takes a folder; names come back relative to it
        let (folder, name_prefix) = match prefix.rsplit_once('/') {
            Some((folder, rest)) => (folder, rest),
            None => ("", prefix),
        };

        let url = format!("{}/object/list/{}", self.base_url, self.bucket);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.service_key)
            .json(&ListRequest {
                prefix: folder,
                limit: 1000,
                offset: 0,
            })
            .send()
            .await
            .map_err(|e| BlobError::NetworkError(e.to_string()))?;

        let objects: Vec<ListedObject> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| BlobError::ParseError(e.to_string()))?;

        Ok(objects
            .into_iter()
            .filter(|o| o.name.starts_with(name_prefix))
            .map(|o| {
                if folder.is_empty() {
                    o.name
                } else {
                    format!("{}/{}", folder, o.name)
                }
            })
            .collect())
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<(), BlobError> {
        let url = format!("{}/object/{}/{}", self.base_url, self.bucket, path);
        tracing::debug!(path = %path, size = bytes.len(), "Uploading object");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.service_key)
            .header("x-upsert", "true")
            .header(
                reqwest::header::CONTENT_TYPE,
                content_type.unwrap_or("application/octet-stream"),
            )
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| BlobError::NetworkError(e.to_string()))?;

        Self::check(response).await?;
        Ok(())
    }

    async fn public_url(&self, path: &str) -> Result<String, BlobError> {
        Ok(format!("{}{}", self.public_prefix(), path))
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize, BlobError> {
        let paths = self.list(prefix).await?;
        if paths.is_empty() {
            return Ok(0);
        }

        let url = format!("{}/object/{}", self.base_url, self.bucket);
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.service_key)
            .json(&serde_json::json!({ "prefixes": paths }))
            .send()
            .await
            .map_err(|e| BlobError::NetworkError(e.to_string()))?;

        Self::check(response).await?;
        Ok(paths.len())
    }

    fn object_path(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.public_prefix()).map(str::to_string)
    }
}

// ============================================================================
// Local filesystem
// ============================================================================

/// Blob store rooted at a local directory; URLs use the `file://` scheme
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(path);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_))
        });
        if path.is_empty() || escapes {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn url_prefix(&self) -> String {
        format!("file://{}/", self.root.display())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        path: &str,
        bytes: &[u8],
        _content_type: Option<&str>,
    ) -> Result<(), BlobError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        Ok(())
    }

    async fn public_url(&self, path: &str) -> Result<String, BlobError> {
        self.resolve(path)?;
        Ok(format!("{}{}", self.url_prefix(), path))
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize, BlobError> {
        let (folder, name_prefix) = match prefix.rsplit_once('/') {
            Some((folder, rest)) => (self.resolve(folder)?, rest),
            None => (self.root.clone(), prefix),
        };

        let mut entries = match tokio::fs::read_dir(&folder).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut deleted = 0;
        while let Some(entry) = entries.next_entry().await? {
            let matches = entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(name_prefix))
                .unwrap_or(false);
            if !matches {
                continue;
            }

            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(entry.path()).await?;
            } else {
                tokio::fs::remove_file(entry.path()).await?;
            }
            deleted += 1;
        }

        Ok(deleted)
    }

    fn object_path(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.url_prefix()).map(str::to_string)
    }
}
