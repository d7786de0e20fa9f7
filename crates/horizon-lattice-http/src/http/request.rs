//! Request descriptors and the builder that produces them.

use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use url::Url;

use super::params::Parameters;
use super::serializer::RequestSerializerKind;
use crate::config::NetworkConfig;
use crate::error::{NetworkError, Result};

/// HTTP request methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// HTTP GET method.
    Get,
    /// HTTP POST method.
    Post,
    /// HTTP PUT method.
    Put,
    /// HTTP DELETE method.
    Delete,
}

impl HttpMethod {
    /// The method name as sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Whether responses to this method may be cached.
    pub fn is_cacheable(self) -> bool {
        matches!(self, Self::Get | Self::Post)
    }

    /// Whether parameters go in the query string by default.
    fn params_in_query(self) -> bool {
        matches!(self, Self::Get | Self::Delete)
    }

    /// Convert to reqwest method.
    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The body of a request.
#[derive(Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// A fully buffered body.
    Bytes {
        /// Value of the `Content-Type` header.
        content_type: String,
        /// The payload.
        data: Bytes,
    },
    /// A body produced incrementally, used for multipart uploads.
    Stream {
        /// Value of the `Content-Type` header.
        content_type: String,
        /// Total length, when known ahead of time.
        length: Option<u64>,
        /// The payload chunks.
        stream: BoxStream<'static, Result<Bytes>>,
    },
}

impl RequestBody {
    /// The content type of the body, if any.
    pub fn content_type(&self) -> Option<&str> {
        match self {
            Self::Empty => None,
            Self::Bytes { content_type, .. } | Self::Stream { content_type, .. } => {
                Some(content_type)
            }
        }
    }

    /// The body length, if known.
    pub fn len(&self) -> Option<u64> {
        match self {
            Self::Empty => Some(0),
            Self::Bytes { data, .. } => Some(data.len() as u64),
            Self::Stream { length, .. } => *length,
        }
    }

    /// Whether the body is known to be empty.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes { content_type, data } => f
                .debug_struct("Bytes")
                .field("content_type", content_type)
                .field("len", &data.len())
                .finish(),
            Self::Stream {
                content_type,
                length,
                ..
            } => f
                .debug_struct("Stream")
                .field("content_type", content_type)
                .field("length", length)
                .finish_non_exhaustive(),
        }
    }
}

/// A fully built request, handed to the transport. Immutable once built.
#[derive(Debug)]
pub struct RequestDescriptor {
    /// The HTTP method.
    pub method: HttpMethod,
    /// The absolute request URL, including any query string.
    pub url: Url,
    /// Request headers.
    pub headers: http::HeaderMap,
    /// Request body.
    pub body: RequestBody,
    /// Timeout for the whole exchange.
    pub timeout: Duration,
    /// Serializer used to encode the parameters.
    pub serializer: RequestSerializerKind,
}

/// Join a request URL onto an optional base URL.
///
/// Absolute URLs (with a scheme) are returned unchanged. Relative URLs are
/// joined with exactly one `/` between base and path.
pub fn resolve_url(base: Option<&str>, url: &str) -> Result<Url> {
    let url = url.trim();
    let joined = if has_scheme(url) {
        url.to_string()
    } else {
        match base.map(str::trim).filter(|b| !b.is_empty()) {
            Some(base) if url.is_empty() => base.to_string(),
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                url.trim_start_matches('/')
            ),
            None => url.to_string(),
        }
    };

    if joined.is_empty() {
        return Err(NetworkError::InvalidUrl("URL is empty".to_string()));
    }
    Url::parse(&joined).map_err(|e| NetworkError::InvalidUrl(format!("{joined}: {e}")))
}

/// Whether `url` starts with `scheme://`.
///
/// Only the part before the query or fragment is inspected, so URLs carried
/// in query values do not count.
fn has_scheme(url: &str) -> bool {
    let head = url.split(['?', '#']).next().unwrap_or_default();
    let Some((scheme, _)) = head.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Builds [`RequestDescriptor`]s from a configuration snapshot.
#[derive(Debug)]
pub struct RequestBuilder<'a> {
    config: &'a NetworkConfig,
}

impl<'a> RequestBuilder<'a> {
    /// Create a builder over a configuration snapshot.
    pub fn new(config: &'a NetworkConfig) -> Self {
        Self { config }
    }

    /// Build a request with serialized parameters.
    ///
    /// GET and DELETE (and every method when query-string serialization is
    /// enabled) carry parameters in the query string. POST and PUT encode
    /// them as the body with the configured serializer.
    pub fn build(
        &self,
        method: HttpMethod,
        url: &Url,
        params: &Parameters,
    ) -> Result<RequestDescriptor> {
        let kind = self.config.request_serializer;
        let serializer = kind.serializer();
        let mut url = url.clone();

        let body = if method.params_in_query() || self.config.query_string_serialization {
            if !params.is_empty() {
                let encoded = serializer.encode_query(params)?;
                let query = match url.query().filter(|q| !q.is_empty()) {
                    Some(existing) => format!("{existing}&{encoded}"),
                    None => encoded,
                };
                url.set_query(Some(&query));
            }
            RequestBody::Empty
        } else {
            RequestBody::Bytes {
                content_type: serializer.content_type().to_string(),
                data: serializer.encode_body(params)?,
            }
        };

        Ok(self.build_with_body(method, url, body))
    }

    /// Build a request with a prepared body.
    pub fn build_with_body(&self, method: HttpMethod, url: Url, body: RequestBody) -> RequestDescriptor {
        let mut headers = self.config.headers.clone();
        if let Some(content_type) = body.content_type()
            && let Ok(value) = http::HeaderValue::from_str(content_type)
        {
            headers.insert(http::header::CONTENT_TYPE, value);
        }

        RequestDescriptor {
            method,
            url,
            headers,
            body,
            timeout: self.config.timeout,
            serializer: self.config.request_serializer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url_joins_with_single_slash() {
        let cases = [
            ("https://api.example.com", "users"),
            ("https://api.example.com/", "users"),
            ("https://api.example.com", "/users"),
            ("https://api.example.com/", "/users"),
        ];
        for (base, path) in cases {
            let url = resolve_url(Some(base), path).unwrap();
            assert_eq!(url.as_str(), "https://api.example.com/users");
        }

        let url = resolve_url(Some("https://api.example.com/v1/"), "/users/1").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/users/1");

        // A URL inside the query string does not make the path absolute.
        let url = resolve_url(
            Some("https://api.example.com"),
            "/login?next=https://app.example.com/home",
        )
        .unwrap();
        assert_eq!(url.host_str(), Some("api.example.com"));
        assert_eq!(url.path(), "/login");
        assert_eq!(url.query(), Some("next=https://app.example.com/home"));

        let url = resolve_url(Some("https://api.example.com"), "redirect#to=http://x.test/").unwrap();
        assert_eq!(url.path(), "/redirect");
    }

    #[test]
    fn test_resolve_url_absolute_ignores_base() {
        let url = resolve_url(Some("https://api.example.com"), "http://other.test/x").unwrap();
        assert_eq!(url.as_str(), "http://other.test/x");
    }

    #[test]
    fn test_resolve_url_invalid() {
        assert!(matches!(
            resolve_url(None, ""),
            Err(NetworkError::InvalidUrl(_))
        ));
        assert!(matches!(
            resolve_url(Some("  "), ""),
            Err(NetworkError::InvalidUrl(_))
        ));
        assert!(matches!(
            resolve_url(None, "users"),
            Err(NetworkError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_get_puts_params_in_query() {
        let config = NetworkConfig::default();
        let url = Url::parse("https://api.example.com/search?lang=en").unwrap();
        let params = Parameters::new().with("q", "rust");
        let request = RequestBuilder::new(&config)
            .build(HttpMethod::Get, &url, &params)
            .unwrap();

        assert_eq!(request.url.as_str(), "https://api.example.com/search?lang=en&q=rust");
        assert!(matches!(request.body, RequestBody::Empty));
        assert!(request.headers.get(http::header::CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_post_encodes_body() {
        let config = NetworkConfig::default()
            .with_header("Authorization", "Bearer t")
            .unwrap();
        let url = Url::parse("https://api.example.com/items").unwrap();
        let params = Parameters::new().with("name", "widget");
        let request = RequestBuilder::new(&config)
            .build(HttpMethod::Post, &url, &params)
            .unwrap();

        assert_eq!(request.url.query(), None);
        assert_eq!(request.headers.get("authorization").unwrap(), "Bearer t");
        assert_eq!(
            request.headers.get(http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        match request.body {
            RequestBody::Bytes { data, .. } => assert_eq!(&data[..], b"{\"name\":\"widget\"}"),
            other => panic!("unexpected body {other:?}"),
        }
        assert_eq!(request.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_query_string_serialization_for_post() {
        let config = NetworkConfig::default().with_query_string_serialization(true);
        let url = Url::parse("https://api.example.com/items").unwrap();
        let params = Parameters::new().with("id", 3);
        let request = RequestBuilder::new(&config)
            .build(HttpMethod::Post, &url, &params)
            .unwrap();

        assert_eq!(request.url.query(), Some("id=3"));
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_form_serializer_content_type() {
        let config = NetworkConfig::default().with_request_serializer(RequestSerializerKind::Form);
        let url = Url::parse("https://api.example.com/login").unwrap();
        let params = Parameters::new().with("user", "a").with("pass", "b c");
        let request = RequestBuilder::new(&config)
            .build(HttpMethod::Put, &url, &params)
            .unwrap();

        assert_eq!(
            request.body.content_type(),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(request.body.len(), Some("pass=b+c&user=a".len() as u64));
    }
}
