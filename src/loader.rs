//! Source resolution for image elements.
//!
//! An image element's `src` is just a string; the loader turns it into raw
//! encoded image bytes. The default implementation understands:
//!
//! - `blob:` identifiers minted by the [`ResourceStore`]
//! - `data:` URLs (base64 or verbatim payloads)
//! - `http://` / `https://` URLs (fetched with a 30s timeout)
//! - anything else, treated as a filesystem path
//!
//! The trait is the seam for embedding hosts with their own asset pipeline.

use crate::resource::ResourceStore;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Timeout applied to remote fetches.
const HTTP_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while resolving a source string.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A `blob:` identifier with no live payload behind it
    #[error("unknown blob resource: {0}")]
    UnknownResource(String),

    /// A `data:` URL that cannot be split or decoded
    #[error("malformed data url: {0}")]
    MalformedDataUrl(String),

    /// Remote fetch failed (connect, status or body read)
    #[error("http fetch failed: {0}")]
    Http(String),

    /// Local file read failed
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves a source string to raw encoded image bytes.
#[async_trait]
pub trait SourceLoader: Send + Sync {
    async fn load(&self, source: &str) -> Result<Bytes, LoadError>;
}

/// Default loader backed by a [`ResourceStore`], an HTTP client and the
/// filesystem.
pub struct DefaultSourceLoader {
    store: ResourceStore,
    http: reqwest::Client,
}

impl DefaultSourceLoader {
    /// Create a loader resolving `blob:` identifiers against `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed (TLS setup
    /// or resource exhaustion).
    pub fn new(store: ResourceStore) -> Result<Self, crate::error::WatermarkError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_FETCH_TIMEOUT)
            .build()
            .map_err(|e| {
                crate::error::WatermarkError::Config(format!("failed to create HTTP client: {e}"))
            })?;
        Ok(Self { store, http })
    }

    async fn fetch_remote(&self, url: &str) -> Result<Bytes, LoadError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LoadError::Http(e.to_string()))?;
        response.bytes().await.map_err(|e| LoadError::Http(e.to_string()))
    }
}

#[async_trait]
impl SourceLoader for DefaultSourceLoader {
    async fn load(&self, source: &str) -> Result<Bytes, LoadError> {
        if source.starts_with(crate::resource::BLOB_SCHEME) {
            return self
                .store
                .get(source)
                .ok_or_else(|| LoadError::UnknownResource(source.to_string()));
        }
        if source.starts_with("data:") {
            return parse_data_url(source);
        }
        if source.starts_with("http://") || source.starts_with("https://") {
            return self.fetch_remote(source).await;
        }
        tokio::fs::read(source)
            .await
            .map(Bytes::from)
            .map_err(|e| LoadError::Io {
                path: source.to_string(),
                source: e,
            })
    }
}

/// Extract the payload of a `data:[<mediatype>][;base64],<data>` URL.
fn parse_data_url(source: &str) -> Result<Bytes, LoadError> {
    let rest = &source["data:".len()..];
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| LoadError::MalformedDataUrl("missing comma separator".to_string()))?;
    if meta.ends_with(";base64") {
        BASE64
            .decode(payload.trim())
            .map(Bytes::from)
            .map_err(|e| LoadError::MalformedDataUrl(e.to_string()))
    } else {
        Ok(Bytes::from(payload.as_bytes().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn loader_with_store() -> (DefaultSourceLoader, ResourceStore) {
        let store = ResourceStore::new();
        let loader = DefaultSourceLoader::new(store.clone()).unwrap();
        (loader, store)
    }

    #[tokio::test]
    async fn test_load_blob_resource() {
        let (loader, store) = loader_with_store();
        let id = store.create(vec![1, 2, 3, 4]);
        let bytes = loader.load(&id).await.unwrap();
        assert_eq!(bytes.as_ref(), &[1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_load_unknown_blob_errors() {
        let (loader, _store) = loader_with_store();
        let err = loader.load("blob:no-such-resource").await.unwrap_err();
        assert!(matches!(err, LoadError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_load_base64_data_url() {
        let (loader, _store) = loader_with_store();
        let url = format!("data:image/png;base64,{}", BASE64.encode(b"payload"));
        let bytes = loader.load(&url).await.unwrap();
        assert_eq!(bytes.as_ref(), b"payload");
    }

    #[tokio::test]
    async fn test_load_plain_data_url() {
        let (loader, _store) = loader_with_store();
        let bytes = loader.load("data:text/plain,hello").await.unwrap();
        assert_eq!(bytes.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_load_malformed_data_url_errors() {
        let (loader, _store) = loader_with_store();
        assert!(matches!(
            loader.load("data:image/png;base64").await.unwrap_err(),
            LoadError::MalformedDataUrl(_)
        ));
        assert!(matches!(
            loader.load("data:image/png;base64,!!!").await.unwrap_err(),
            LoadError::MalformedDataUrl(_)
        ));
    }

    #[tokio::test]
    async fn test_load_file_path() {
        let (loader, _store) = loader_with_store();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"file bytes").unwrap();
        let bytes = loader.load(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(bytes.as_ref(), b"file bytes");
    }

    #[tokio::test]
    async fn test_load_missing_file_errors() {
        let (loader, _store) = loader_with_store();
        let err = loader.load("/nonexistent/image.png").await.unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
