//! Configuration for the network manager.
//!
//! A [`NetworkConfig`] is an explicit value handed to
//! [`NetworkManager::builder`](crate::NetworkManager::builder). The manager
//! keeps its own copy and changes it only through its setters; every request
//! works on a snapshot taken when it starts.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use horizon_lattice_http::{NetworkConfig, RequestSerializerKind};
//!
//! let config = NetworkConfig::default()
//!     .with_base_url("https://api.example.com/v1")
//!     .with_timeout(Duration::from_secs(15))
//!     .with_request_serializer(RequestSerializerKind::Form)
//!     .with_cache_limit_mb(200);
//!
//! // Or from a TOML file
//! let config = NetworkConfig::from_toml_file("network.toml")?;
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{NetworkError, Result};
use crate::http::serializer::{RequestSerializerKind, ResponseSerializerKind};
use crate::task::DuplicatePolicy;

/// Default request timeout (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const CACHE_DIR_NAME: &str = "horizon-lattice-http";

/// Settings shared by every request issued through a manager.
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    /// Base URL joined in front of relative request URLs.
    pub base_url: Option<String>,
    /// Per-request timeout enforced by the transport.
    pub timeout: Duration,
    /// How request parameters are encoded.
    pub request_serializer: RequestSerializerKind,
    /// How response bodies are validated.
    pub response_serializer: ResponseSerializerKind,
    /// Headers injected into every request.
    pub headers: http::HeaderMap,
    /// Put parameters in the query string for every method, not only GET/DELETE.
    pub query_string_serialization: bool,
    /// Log requests and responses at `info` level.
    pub log_enabled: bool,
    /// Cache size threshold in bytes. `0` disables automatic trimming.
    pub cache_limit_bytes: u64,
    /// Directory holding cached responses.
    pub cache_dir: PathBuf,
    /// What to do when a request key is already in flight.
    pub duplicate_policy: DuplicatePolicy,
    /// User agent sent by the default transport.
    pub user_agent: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            request_serializer: RequestSerializerKind::Json,
            response_serializer: ResponseSerializerKind::Json,
            headers: http::HeaderMap::new(),
            query_string_serialization: false,
            log_enabled: false,
            cache_limit_bytes: 0,
            cache_dir: default_cache_dir(),
            duplicate_policy: DuplicatePolicy::Reject,
            user_agent: Some(format!(
                "HorizonLattice/{} (Rust)",
                env!("CARGO_PKG_VERSION")
            )),
        }
    }
}

impl NetworkConfig {
    /// Set the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the request serializer.
    #[must_use]
    pub fn with_request_serializer(mut self, kind: RequestSerializerKind) -> Self {
        self.request_serializer = kind;
        self
    }

    /// Set the response serializer.
    #[must_use]
    pub fn with_response_serializer(mut self, kind: ResponseSerializerKind) -> Self {
        self.response_serializer = kind;
        self
    }

    /// Add a header sent with every request.
    pub fn with_header(
        mut self,
        name: impl TryInto<http::HeaderName>,
        value: impl TryInto<http::HeaderValue>,
    ) -> Result<Self> {
        let name = name
            .try_into()
            .map_err(|_| NetworkError::InvalidHeader("Invalid header name".to_string()))?;
        let value = value
            .try_into()
            .map_err(|_| NetworkError::InvalidHeader("Invalid header value".to_string()))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Enable or disable query-string serialization for all methods.
    #[must_use]
    pub fn with_query_string_serialization(mut self, enabled: bool) -> Self {
        self.query_string_serialization = enabled;
        self
    }

    /// Enable or disable request logging.
    #[must_use]
    pub fn with_log_enabled(mut self, enabled: bool) -> Self {
        self.log_enabled = enabled;
        self
    }

    /// Set the cache threshold in megabytes. `0` disables trimming.
    #[must_use]
    pub fn with_cache_limit_mb(mut self, mb: u64) -> Self {
        self.cache_limit_bytes = mb.saturating_mul(1024 * 1024);
        self
    }

    /// Set the cache threshold in bytes. `0` disables trimming.
    #[must_use]
    pub fn with_cache_limit_bytes(mut self, bytes: u64) -> Self {
        self.cache_limit_bytes = bytes;
        self
    }

    /// Set the cache directory.
    #[must_use]
    pub fn with_cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = path.into();
        self
    }

    /// Set the duplicate in-flight request policy.
    #[must_use]
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Set the user agent used by the default transport.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Parse a configuration from TOML.
    ///
    /// Missing keys keep their defaults:
    ///
    /// ```toml
    /// base_url = "https://api.example.com"
    /// timeout_secs = 15
    /// request_serializer = "form"
    /// response_serializer = "json"
    /// cache_limit_mb = 100
    /// duplicate_policy = "cancel_and_replace"
    ///
    /// [headers]
    /// Accept-Language = "en"
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(source)?;
        file.into_config()
    }

    /// Read and parse a TOML configuration file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }
}

/// On-disk shape of the configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    timeout_secs: Option<f64>,
    request_serializer: Option<RequestSerializerKind>,
    response_serializer: Option<ResponseSerializerKind>,
    headers: BTreeMap<String, String>,
    query_string_serialization: Option<bool>,
    log_enabled: Option<bool>,
    cache_limit_mb: Option<u64>,
    cache_dir: Option<PathBuf>,
    duplicate_policy: Option<DuplicatePolicy>,
    user_agent: Option<String>,
}

impl ConfigFile {
    fn into_config(self) -> Result<NetworkConfig> {
        let mut config = NetworkConfig::default();
        config.base_url = self.base_url;
        if let Some(secs) = self.timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(NetworkError::Config(format!(
                    "timeout_secs must be positive, got {secs}"
                )));
            }
            config.timeout = Duration::from_secs_f64(secs);
        }
        if let Some(kind) = self.request_serializer {
            config.request_serializer = kind;
        }
        if let Some(kind) = self.response_serializer {
            config.response_serializer = kind;
        }
        for (name, value) in self.headers {
            config = config.with_header(name.as_str(), value.as_str())?;
        }
        if let Some(enabled) = self.query_string_serialization {
            config.query_string_serialization = enabled;
        }
        if let Some(enabled) = self.log_enabled {
            config.log_enabled = enabled;
        }
        if let Some(mb) = self.cache_limit_mb {
            config = config.with_cache_limit_mb(mb);
        }
        if let Some(dir) = self.cache_dir {
            config.cache_dir = dir;
        }
        if let Some(policy) = self.duplicate_policy {
            config.duplicate_policy = policy;
        }
        if self.user_agent.is_some() {
            config.user_agent = self.user_agent;
        }
        Ok(config)
    }
}

/// Platform cache directory for responses, falling back to the temp dir.
fn default_cache_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.cache_dir().join(CACHE_DIR_NAME))
        .unwrap_or_else(|| std::env::temp_dir().join(CACHE_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.request_serializer, RequestSerializerKind::Json);
        assert_eq!(config.response_serializer, ResponseSerializerKind::Json);
        assert_eq!(config.cache_limit_bytes, 0);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Reject);
        assert!(!config.log_enabled);
        assert!(config.base_url.is_none());
        assert!(config.cache_dir.ends_with(CACHE_DIR_NAME));
    }

    #[test]
    fn test_builder_methods() {
        let config = NetworkConfig::default()
            .with_base_url("https://api.example.com")
            .with_timeout(Duration::from_secs(5))
            .with_cache_limit_mb(2)
            .with_header("X-Client", "lattice")
            .unwrap();

        assert_eq!(config.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.cache_limit_bytes, 2 * 1024 * 1024);
        assert_eq!(config.headers.get("x-client").unwrap(), "lattice");
    }

    #[test]
    fn test_invalid_header_rejected() {
        let result = NetworkConfig::default().with_header("bad header", "value");
        assert!(matches!(result, Err(NetworkError::InvalidHeader(_))));
    }

    #[test]
    fn test_from_toml() {
        let config = NetworkConfig::from_toml_str(
            r#"
            base_url = "https://api.example.com"
            timeout_secs = 12.5
            request_serializer = "form"
            response_serializer = "raw"
            log_enabled = true
            cache_limit_mb = 1
            duplicate_policy = "cancel_and_replace"

            [headers]
            Accept-Language = "en"
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(config.timeout, Duration::from_millis(12_500));
        assert_eq!(config.request_serializer, RequestSerializerKind::Form);
        assert_eq!(config.response_serializer, ResponseSerializerKind::Raw);
        assert!(config.log_enabled);
        assert_eq!(config.cache_limit_bytes, 1024 * 1024);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::CancelAndReplace);
        assert_eq!(config.headers.get("accept-language").unwrap(), "en");
    }

    #[test]
    fn test_huge_cache_limit_saturates() {
        let config = NetworkConfig::from_toml_str("cache_limit_mb = 9223372036854775807").unwrap();
        assert_eq!(config.cache_limit_bytes, u64::MAX);

        let config = NetworkConfig::default().with_cache_limit_mb(u64::MAX);
        assert_eq!(config.cache_limit_bytes, u64::MAX);
    }

    #[test]
    fn test_from_toml_rejects_bad_timeout() {
        let result = NetworkConfig::from_toml_str("timeout_secs = 0");
        assert!(matches!(result, Err(NetworkError::Config(_))));
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let result = NetworkConfig::from_toml_str("retries = 3");
        assert!(matches!(result, Err(NetworkError::Config(_))));
    }
}
