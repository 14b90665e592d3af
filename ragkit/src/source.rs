//! Fetching raw document bytes and saving a local copy.
//!
//! [`DocumentSource`] is the boundary for where documents come from. The
//! core only needs bytes; text extraction beyond lossy UTF-8 decoding is left
//! to callers.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{RagError, Result};

/// A place documents are fetched from.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch the raw bytes addressed by `locator`.
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>>;
}

fn source_error(locator: &str, message: impl Into<String>) -> RagError {
    RagError::SourceError { locator: locator.to_string(), message: message.into() }
}

/// Reads documents from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSource;

#[async_trait]
impl DocumentSource for FileSource {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        let path = locator.strip_prefix("file://").unwrap_or(locator);
        let bytes = tokio::fs::read(path).await.map_err(|e| source_error(locator, e.to_string()))?;
        debug!(path, bytes = bytes.len(), "read document from disk");
        Ok(bytes)
    }
}

/// Downloads documents over HTTP(S).
///
/// Only available with the `http` feature.
#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct HttpSource {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse an existing client, e.g. one with custom timeouts.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl DocumentSource for HttpSource {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|e| source_error(locator, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(source_error(locator, format!("server returned {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| source_error(locator, format!("failed to read body: {e}")))?;
        debug!(url = locator, bytes = bytes.len(), "downloaded document");
        Ok(bytes.to_vec())
    }
}

/// Whether `locator` looks like an HTTP(S) URL rather than a path.
pub fn is_remote(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}

/// Write fetched bytes to `path`, creating parent directories as needed.
pub async fn persist(bytes: &[u8], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let locator = path.display().to_string();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| source_error(&locator, e.to_string()))?;
    }
    tokio::fs::write(path, bytes).await.map_err(|e| source_error(&locator, e.to_string()))?;
    info!(path = %locator, bytes = bytes.len(), "saved document");
    Ok(())
}
