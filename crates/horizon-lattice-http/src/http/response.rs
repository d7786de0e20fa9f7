//! Response types.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::{NetworkError, Result};

/// A fully received response, either fresh from the transport or replayed
/// from the cache.
#[derive(Clone)]
pub struct Response {
    status: u16,
    headers: http::HeaderMap,
    url: String,
    body: Bytes,
    from_cache: bool,
    saved_to: Option<PathBuf>,
}

impl Response {
    pub(crate) fn new(status: u16, headers: http::HeaderMap, url: String, body: Bytes) -> Self {
        Self {
            status,
            headers,
            url,
            body,
            from_cache: false,
            saved_to: None,
        }
    }

    /// A response whose body was written to `path` instead of memory.
    pub(crate) fn saved(status: u16, headers: http::HeaderMap, url: String, path: PathBuf) -> Self {
        Self {
            status,
            headers,
            url,
            body: Bytes::new(),
            from_cache: false,
            saved_to: Some(path),
        }
    }

    /// A response replayed from a cached payload.
    pub(crate) fn cached(url: String, body: Bytes) -> Self {
        Self {
            status: 200,
            headers: http::HeaderMap::new(),
            url,
            body,
            from_cache: true,
            saved_to: None,
        }
    }

    /// Get the HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Check if the response indicates success (2xx status).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Get the response headers. Cached responses carry no headers.
    pub fn headers(&self) -> &http::HeaderMap {
        &self.headers
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// The resolved request URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether this response was served from the cache.
    pub fn is_from_cache(&self) -> bool {
        self.from_cache
    }

    /// Where a download was saved. The in-memory body is empty in that case.
    pub fn saved_path(&self) -> Option<&Path> {
        self.saved_to.as_deref()
    }

    /// Borrow the body.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Take the body.
    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    /// Decode the body as UTF-8 text.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| NetworkError::Serialization(e.to_string()))
    }

    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("url", &self.url)
            .field("len", &self.body.len())
            .field("from_cache", &self.from_cache)
            .field("saved_to", &self.saved_to)
            .finish()
    }
}

/// Receives transfer progress. Called from runtime worker threads.
pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Progress information for downloads/uploads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferProgress {
    /// Number of bytes transferred so far.
    pub bytes_transferred: u64,
    /// Total number of bytes, if known.
    pub total_bytes: Option<u64>,
}

impl TransferProgress {
    /// Create a progress report.
    pub fn new(bytes_transferred: u64, total_bytes: Option<u64>) -> Self {
        Self {
            bytes_transferred,
            total_bytes,
        }
    }

    /// Get the progress as a fraction (0.0 to 1.0), if total is known.
    pub fn fraction(&self) -> Option<f64> {
        self.total_bytes.map(|total| {
            if total == 0 {
                1.0
            } else {
                (self.bytes_transferred as f64 / total as f64).min(1.0)
            }
        })
    }

    /// Get the progress as a percentage (0 to 100), if total is known.
    pub fn percent(&self) -> Option<u8> {
        self.fraction().map(|f| (f * 100.0) as u8)
    }
}
