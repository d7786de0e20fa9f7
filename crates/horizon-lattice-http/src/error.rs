//! Error types for the HTTP facade.

use thiserror::Error;

/// Errors surfaced by the network manager.
///
/// Cache failures are the exception: [`NetworkError::CacheWrite`] and
/// [`NetworkError::CacheRead`] are produced internally and logged, but a
/// request never fails because of them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The URL was empty after joining with the base URL, or did not parse.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A request with the same task key is already in flight and the
    /// duplicate policy rejects concurrent duplicates.
    #[error("a request for {key} is already in flight")]
    DuplicateRequest {
        /// The task key that was already registered.
        key: String,
    },

    /// Network, DNS or TLS failure reported by the transport engine.
    #[error("transport error: {0}")]
    Transport(String),

    /// Connection refused or failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The transport did not finish within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The request was cancelled before it completed.
    #[error("request was cancelled")]
    Cancelled,

    /// Writing a response into the cache failed.
    #[error("cache write error: {0}")]
    CacheWrite(String),

    /// Reading a response from the cache failed.
    #[error("cache read error: {0}")]
    CacheRead(String),

    /// Parameters or a response body could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}{}", status_suffix(.message))]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// Optional error message from the response body.
        message: Option<String>,
    },

    /// Local I/O error (upload source, download target).
    #[error("I/O error: {0}")]
    Io(String),

    /// Invalid header name or value.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// An image could not be decoded or re-encoded for upload.
    #[error("image error: {0}")]
    Image(String),

    /// The platform reachability primitive failed.
    #[error("reachability error: {0}")]
    Reachability(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl NetworkError {
    /// Whether this error is the result of a user-initiated cancellation.
    ///
    /// UI code typically suppresses error surfaces for these.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for NetworkError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_urlencoded::ser::Error> for NetworkError {
    fn from(err: serde_urlencoded::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for NetworkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for NetworkError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for NetworkError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<image::ImageError> for NetworkError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err.to_string())
    }
}

impl From<toml::de::Error> for NetworkError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

fn status_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

/// A specialized Result type for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display() {
        let err = NetworkError::HttpStatus {
            status: 404,
            message: Some("not found".to_string()),
        };
        assert_eq!(err.to_string(), "HTTP 404: not found");

        let err = NetworkError::HttpStatus {
            status: 500,
            message: None,
        };
        assert_eq!(err.to_string(), "HTTP 500");
    }

    #[test]
    fn test_cancelled_is_distinguishable() {
        assert!(NetworkError::Cancelled.is_cancelled());
        assert!(!NetworkError::Transport("reset".into()).is_cancelled());
        assert!(NetworkError::Timeout.is_timeout());
    }
}
