//! The network manager facade.
//!
//! [`NetworkManager`] is the single entry point for requests, uploads,
//! downloads, the response cache, cancellation and reachability. It is
//! cheap to clone; clones share the same registry, cache and configuration.
//!
//! # Example
//!
//! ```ignore
//! use horizon_lattice_http::{NetworkConfig, NetworkManager, Parameters, RequestCallbacks};
//!
//! let manager = NetworkManager::builder(
//!     NetworkConfig::default().with_base_url("https://api.example.com"),
//! )
//! .build()?;
//!
//! // Callback style
//! manager.get(
//!     "/items",
//!     Parameters::new().with("page", 2),
//!     true,
//!     RequestCallbacks::new(
//!         |response| println!("{} bytes", response.bytes().len()),
//!         |error| eprintln!("failed: {error}"),
//!     ),
//! );
//!
//! // Async style
//! let response = manager
//!     .request(HttpMethod::Get, "/items")
//!     .cache(true)
//!     .send()?
//!     .await?;
//! ```

mod lifecycle;
mod options;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::runtime::Handle;

use crate::cache::{CacheManager, CacheStats};
use crate::config::NetworkConfig;
use crate::error::Result;
use crate::http::{
    HttpMethod, Parameters, RequestSerializerKind, ReqwestTransport, ResponseSerializerKind,
    Transport, resolve_url,
};
use crate::logging::targets;
use crate::reachability::{
    ConnectivitySource, NetworkInterfaceSource, ReachabilityMonitor, ReachabilityStatus,
    SubscriptionId,
};
use crate::task::{DuplicatePolicy, TaskHandle, TaskRegistry};
use crate::upload::{ImageUpload, UploadPart, guess_content_type};

pub use options::{RequestCallbacks, RequestOptions, RequestTask};

pub(crate) struct ManagerInner {
    config: RwLock<NetworkConfig>,
    transport: Arc<dyn Transport>,
    cache: Option<Arc<CacheManager>>,
    registry: TaskRegistry,
    reachability: ReachabilityMonitor,
    connectivity: Arc<dyn ConnectivitySource>,
    runtime: Handle,
}

/// Builder for [`NetworkManager`].
#[must_use = "builders do nothing unless built"]
pub struct NetworkManagerBuilder {
    config: NetworkConfig,
    transport: Option<Arc<dyn Transport>>,
    connectivity: Option<Arc<dyn ConnectivitySource>>,
    runtime: Option<Handle>,
}

impl NetworkManagerBuilder {
    /// Use a custom transport instead of the reqwest one.
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Use a shared transport.
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom reachability source instead of the interface watcher.
    pub fn connectivity_source(mut self, source: impl ConnectivitySource + 'static) -> Self {
        self.connectivity = Some(Arc::new(source));
        self
    }

    /// Run request tasks on this runtime.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Build the manager.
    ///
    /// Opens the cache directory and trims it to the configured limit. A
    /// cache directory that cannot be opened disables caching instead of
    /// failing.
    pub fn build(self) -> Result<NetworkManager> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::from_config(&self.config)?),
        };
        let connectivity: Arc<dyn ConnectivitySource> = match self.connectivity {
            Some(source) => source,
            None => Arc::new(NetworkInterfaceSource::new()),
        };
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => crate::runtime::handle()?,
        };

        let cache = match CacheManager::open(&self.config.cache_dir) {
            Ok(cache) => {
                if self.config.cache_limit_bytes > 0 {
                    cache.enforce_limit(self.config.cache_limit_bytes);
                }
                Some(Arc::new(cache))
            }
            Err(err) => {
                tracing::warn!(
                    target: targets::CACHE,
                    dir = %self.config.cache_dir.display(),
                    error = %err,
                    "cache unavailable, caching disabled"
                );
                None
            }
        };

        tracing::debug!(
            target: targets::MANAGER,
            base_url = ?self.config.base_url,
            caching = cache.is_some(),
            "network manager ready"
        );

        Ok(NetworkManager {
            inner: Arc::new(ManagerInner {
                registry: TaskRegistry::new(self.config.duplicate_policy),
                config: RwLock::new(self.config),
                transport,
                cache,
                reachability: ReachabilityMonitor::new(),
                connectivity,
                runtime,
            }),
        })
    }
}

impl std::fmt::Debug for NetworkManagerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkManagerBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.transport.is_some())
            .field("custom_connectivity", &self.connectivity.is_some())
            .finish_non_exhaustive()
    }
}

/// Unified HTTP client facade.
#[derive(Clone)]
pub struct NetworkManager {
    inner: Arc<ManagerInner>,
}

impl NetworkManager {
    /// Start building a manager around `config`.
    pub fn builder(config: NetworkConfig) -> NetworkManagerBuilder {
        NetworkManagerBuilder {
            config,
            transport: None,
            connectivity: None,
            runtime: None,
        }
    }

    /// Build a manager with the default transport and reachability source.
    pub fn new(config: NetworkConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Configure a request to send with [`RequestOptions::send`] or
    /// [`RequestOptions::execute`].
    pub fn request(&self, method: HttpMethod, url: impl Into<String>) -> RequestOptions {
        RequestOptions::new(self.clone(), method, url)
    }

    /// Issue a request and report through callbacks.
    ///
    /// `cacheable` only has an effect for GET and POST.
    pub fn execute(
        &self,
        method: HttpMethod,
        url: impl Into<String>,
        parameters: Parameters,
        cacheable: bool,
        callbacks: RequestCallbacks,
    ) -> TaskHandle {
        self.request(method, url)
            .parameters(parameters)
            .cache(cacheable)
            .execute(callbacks)
    }

    /// Issue a GET request.
    pub fn get(
        &self,
        url: impl Into<String>,
        parameters: Parameters,
        cacheable: bool,
        callbacks: RequestCallbacks,
    ) -> TaskHandle {
        self.execute(HttpMethod::Get, url, parameters, cacheable, callbacks)
    }

    /// Issue a POST request.
    pub fn post(
        &self,
        url: impl Into<String>,
        parameters: Parameters,
        cacheable: bool,
        callbacks: RequestCallbacks,
    ) -> TaskHandle {
        self.execute(HttpMethod::Post, url, parameters, cacheable, callbacks)
    }

    /// Issue a PUT request. PUT responses are never cached.
    pub fn put(
        &self,
        url: impl Into<String>,
        parameters: Parameters,
        callbacks: RequestCallbacks,
    ) -> TaskHandle {
        self.execute(HttpMethod::Put, url, parameters, false, callbacks)
    }

    /// Issue a DELETE request. DELETE responses are never cached.
    pub fn delete(
        &self,
        url: impl Into<String>,
        parameters: Parameters,
        callbacks: RequestCallbacks,
    ) -> TaskHandle {
        self.execute(HttpMethod::Delete, url, parameters, false, callbacks)
    }

    /// Upload images as a multipart POST.
    ///
    /// Images are re-encoded before the request starts; progress reports
    /// bytes sent.
    pub fn upload_images(
        &self,
        url: impl Into<String>,
        parameters: Parameters,
        images: ImageUpload,
        callbacks: RequestCallbacks,
    ) -> TaskHandle {
        self.request(HttpMethod::Post, url)
            .parameters(parameters)
            .parts(images.into_parts())
            .execute(callbacks)
    }

    /// Upload a video file as a multipart POST, streamed from disk.
    pub fn upload_video(
        &self,
        url: impl Into<String>,
        parameters: Parameters,
        field_name: impl Into<String>,
        path: impl Into<PathBuf>,
        callbacks: RequestCallbacks,
    ) -> TaskHandle {
        let path = path.into();
        let mut part = UploadPart::file(field_name, path.clone());
        if guess_content_type(&path) == "application/octet-stream" {
            part = part.with_content_type("video/mp4");
        }
        self.request(HttpMethod::Post, url)
            .parameters(parameters)
            .part(part)
            .execute(callbacks)
    }

    /// Upload any file as a multipart POST, streamed from disk.
    pub fn upload_file(
        &self,
        url: impl Into<String>,
        parameters: Parameters,
        field_name: impl Into<String>,
        path: impl Into<PathBuf>,
        callbacks: RequestCallbacks,
    ) -> TaskHandle {
        self.request(HttpMethod::Post, url)
            .parameters(parameters)
            .part(UploadPart::file(field_name, path))
            .execute(callbacks)
    }

    /// Download `url` into `save_path`, creating parent directories.
    ///
    /// The response passed to `on_success` carries the path in
    /// [`Response::saved_path`](crate::Response::saved_path).
    pub fn download_file(
        &self,
        url: impl Into<String>,
        save_path: impl Into<PathBuf>,
        callbacks: RequestCallbacks,
    ) -> TaskHandle {
        self.request(HttpMethod::Get, url)
            .save_to(save_path)
            .execute(callbacks)
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Cancel the in-flight request for `url` (or an explicit request key).
    ///
    /// Relative URLs are resolved against the base URL first. Returns whether
    /// a request was cancelled.
    pub fn cancel(&self, url: &str) -> bool {
        if self.inner.registry.cancel(url) {
            return true;
        }
        let base_url = self.inner.config.read().base_url.clone();
        match resolve_url(base_url.as_deref(), url) {
            Ok(resolved) if resolved.as_str() != url => self.inner.registry.cancel(resolved.as_str()),
            _ => false,
        }
    }

    /// Cancel every in-flight request. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        self.inner.registry.cancel_all()
    }

    /// Number of requests in flight.
    pub fn active_requests(&self) -> usize {
        self.inner.registry.len()
    }

    /// Whether a request is in flight for `key`.
    pub fn is_active(&self, key: &str) -> bool {
        self.inner.registry.contains(key)
    }

    // =========================================================================
    // Cache
    // =========================================================================

    /// Delete every cached response. Blocks on disk I/O.
    pub fn clear_cache(&self) -> Result<()> {
        match &self.inner.cache {
            Some(cache) => cache.clear_all(),
            None => Ok(()),
        }
    }

    /// Cache statistics, or `None` when caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.inner.cache.as_ref().map(|cache| cache.stats())
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Snapshot of the current configuration.
    pub fn config(&self) -> NetworkConfig {
        self.inner.config.read().clone()
    }

    /// Set or clear the base URL joined to relative request URLs.
    pub fn set_base_url(&self, base_url: Option<String>) {
        self.inner.config.write().base_url = base_url;
    }

    /// Set the per-request timeout.
    pub fn set_timeout(&self, timeout: Duration) {
        self.inner.config.write().timeout = timeout;
    }

    /// Set how request parameters are encoded.
    pub fn set_request_serializer(&self, kind: RequestSerializerKind) {
        self.inner.config.write().request_serializer = kind;
    }

    /// Set how response bodies are validated.
    pub fn set_response_serializer(&self, kind: ResponseSerializerKind) {
        self.inner.config.write().response_serializer = kind;
    }

    /// Add or replace a header sent with every request.
    pub fn set_header(&self, name: &str, value: &str) -> Result<()> {
        let name = http::HeaderName::from_bytes(name.as_bytes())?;
        let value = http::HeaderValue::from_str(value)?;
        self.inner.config.write().headers.insert(name, value);
        Ok(())
    }

    /// Remove one header. Returns whether it was set.
    pub fn remove_header(&self, name: &str) -> bool {
        self.inner.config.write().headers.remove(name).is_some()
    }

    /// Set a bearer token in the `Authorization` header.
    pub fn set_authorization(&self, token: &str) -> Result<()> {
        let mut value = http::HeaderValue::from_str(&format!("Bearer {token}"))?;
        value.set_sensitive(true);
        self.inner
            .config
            .write()
            .headers
            .insert(http::header::AUTHORIZATION, value);
        Ok(())
    }

    /// Remove the `Authorization` header.
    pub fn clear_authorization(&self) {
        self.inner
            .config
            .write()
            .headers
            .remove(http::header::AUTHORIZATION);
    }

    /// Remove every custom header.
    pub fn clear_headers(&self) {
        self.inner.config.write().headers.clear();
    }

    /// Send parameters in the query string for every method.
    pub fn set_query_string_serialization(&self, enabled: bool) {
        self.inner.config.write().query_string_serialization = enabled;
    }

    /// Turn request/response logging on or off.
    pub fn set_log_enabled(&self, enabled: bool) {
        self.inner.config.write().log_enabled = enabled;
    }

    /// Set the cache size limit in megabytes and trim the cache once in the
    /// background. Zero disables trimming.
    pub fn set_cache_limit_mb(&self, mb: u64) {
        let limit = mb.saturating_mul(1024 * 1024);
        self.inner.config.write().cache_limit_bytes = limit;

        if limit == 0 {
            return;
        }
        if let Some(cache) = self.inner.cache.clone() {
            self.inner.runtime.spawn_blocking(move || {
                let evicted = cache.enforce_limit(limit);
                tracing::debug!(target: targets::CACHE, evicted, limit, "cache trimmed");
            });
        }
    }

    /// Set how duplicate in-flight requests are handled.
    pub fn set_duplicate_policy(&self, policy: DuplicatePolicy) {
        self.inner.config.write().duplicate_policy = policy;
        self.inner.registry.set_policy(policy);
    }

    // =========================================================================
    // Reachability
    // =========================================================================

    /// The reachability monitor.
    pub fn reachability(&self) -> &ReachabilityMonitor {
        &self.inner.reachability
    }

    /// The most recent reachability status.
    pub fn reachability_status(&self) -> ReachabilityStatus {
        self.inner.reachability.status()
    }

    /// Subscribe to reachability events and start monitoring if needed.
    pub fn start_monitoring<F>(&self, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(ReachabilityStatus) + Send + Sync + 'static,
    {
        let id = self.inner.reachability.subscribe(callback);
        if let Err(err) = self.inner.reachability.start(self.inner.connectivity.as_ref()) {
            self.inner.reachability.unsubscribe(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Stop monitoring and drop every reachability subscriber.
    pub fn stop_monitoring(&self) {
        self.inner.reachability.stop();
    }
}

impl std::fmt::Debug for NetworkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkManager")
            .field("active_requests", &self.inner.registry.len())
            .field("caching", &self.inner.cache.is_some())
            .field("reachability", &self.inner.reachability.status())
            .finish_non_exhaustive()
    }
}
