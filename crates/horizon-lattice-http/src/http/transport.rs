//! Transport engines.
//!
//! The [`Transport`] trait is the seam between the manager and the actual
//! network I/O. [`ReqwestTransport`] is the production engine; tests plug in
//! an in-process engine that never touches the network.

use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::redirect::Policy;

use super::request::{RequestBody, RequestDescriptor};
use crate::config::NetworkConfig;
use crate::error::{NetworkError, Result};
use crate::logging::targets;

/// Performs the network exchange for a built request.
///
/// Dropping the returned future (or the body stream) must abort the
/// in-flight operation; the manager relies on this for cancellation.
pub trait Transport: Send + Sync + 'static {
    /// Send a request and resolve once the response head is available.
    fn send(&self, request: RequestDescriptor) -> BoxFuture<'static, Result<TransportResponse>>;
}

/// Response head plus a streamed body.
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: http::HeaderMap,
    /// Body length announced by the server, if any.
    pub content_length: Option<u64>,
    /// Body chunks.
    pub body: BoxStream<'static, Result<Bytes>>,
}

impl TransportResponse {
    /// A response whose body is already in memory.
    pub fn from_bytes(status: u16, headers: http::HeaderMap, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            status,
            headers,
            content_length: Some(body.len() as u64),
            body: stream::once(async move { Ok(body) }).boxed(),
        }
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Settings for [`ReqwestTransport`].
#[derive(Clone, Debug)]
struct ReqwestTransportConfig {
    connect_timeout: Option<Duration>,
    follow_redirects: bool,
    max_redirects: usize,
    cookies_enabled: bool,
    user_agent: Option<String>,
    proxy: Option<String>,
}

impl Default for ReqwestTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            follow_redirects: true,
            max_redirects: 10,
            cookies_enabled: true,
            user_agent: None,
            proxy: None,
        }
    }
}

/// Builder for [`ReqwestTransport`].
#[derive(Debug, Default)]
pub struct ReqwestTransportBuilder {
    config: ReqwestTransportConfig,
}

impl ReqwestTransportBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Disable redirect following.
    pub fn no_redirects(mut self) -> Self {
        self.config.follow_redirects = false;
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Disable cookie storage.
    pub fn no_cookies(mut self) -> Self {
        self.config.cookies_enabled = false;
        self
    }

    /// Set the user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Route all traffic through a proxy.
    pub fn proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy_url.into());
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<ReqwestTransport> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = self.config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        if self.config.follow_redirects {
            builder = builder.redirect(Policy::limited(self.config.max_redirects));
        } else {
            builder = builder.redirect(Policy::none());
        }

        if self.config.cookies_enabled {
            builder = builder.cookie_store(true);
        }

        if let Some(ref ua) = self.config.user_agent {
            builder = builder.user_agent(ua);
        }

        if let Some(ref proxy_url) = self.config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| NetworkError::Config(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;
        Ok(ReqwestTransport { client })
    }
}

/// Transport engine backed by `reqwest`.
///
/// Handles connection pooling, redirects, TLS and cookies. Request timeouts
/// come from each [`RequestDescriptor`].
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a builder.
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::new()
    }

    /// Create a transport using the user agent from a configuration.
    pub fn from_config(config: &NetworkConfig) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(ref ua) = config.user_agent {
            builder = builder.user_agent(ua.clone());
        }
        builder.build()
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: RequestDescriptor) -> BoxFuture<'static, Result<TransportResponse>> {
        let client = self.client.clone();
        Box::pin(async move {
            tracing::trace!(
                target: targets::TRANSPORT,
                method = %request.method,
                url = %request.url,
                "sending request"
            );

            let mut builder = client
                .request(request.method.to_reqwest(), request.url)
                .headers(request.headers)
                .timeout(request.timeout);

            builder = match request.body {
                RequestBody::Empty => builder,
                RequestBody::Bytes { data, .. } => builder.body(data),
                RequestBody::Stream { length, stream, .. } => {
                    if let Some(length) = length {
                        builder = builder.header(http::header::CONTENT_LENGTH, length);
                    }
                    builder.body(reqwest::Body::wrap_stream(stream))
                }
            };

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let content_length = response.content_length();

            tracing::trace!(
                target: targets::TRANSPORT,
                status,
                content_length,
                "received response head"
            );

            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(NetworkError::from))
                .boxed();

            Ok(TransportResponse {
                status,
                headers,
                content_length,
                body,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_bytes_response() {
        let mut response = TransportResponse::from_bytes(200, http::HeaderMap::new(), "hello");
        assert_eq!(response.content_length, Some(5));
        let chunk = response.body.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"hello");
        assert!(response.body.next().await.is_none());
    }

    #[test]
    fn test_from_config() {
        let config = NetworkConfig::default().with_user_agent("test-agent/1.0");
        assert!(ReqwestTransport::from_config(&config).is_ok());
    }
}
