//! Shared fixtures: an in-process transport and a manual reachability source.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt, stream};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use horizon_lattice_http::http::{RequestBody, RequestDescriptor};
use horizon_lattice_http::reachability::{ConnectivitySink, SourceGuard};
use horizon_lattice_http::{
    ConnectivitySource, HttpMethod, NetworkConfig, NetworkError, NetworkManager, ReachabilityStatus,
    Result, Transport, TransportResponse,
};

pub const BASE_URL: &str = "https://api.example.com";

/// A canned response for one path.
#[derive(Clone)]
pub struct MockRoute {
    status: u16,
    headers: http::HeaderMap,
    chunks: Vec<Bytes>,
    gate: Option<Arc<Semaphore>>,
    failure: Option<fn() -> NetworkError>,
}

impl MockRoute {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::status(200, body)
    }

    pub fn json(value: serde_json::Value) -> Self {
        let mut route = Self::ok(value.to_string());
        route.headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        route
    }

    pub fn status(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: http::HeaderMap::new(),
            chunks: vec![body.into()],
            gate: None,
            failure: None,
        }
    }

    /// Respond with the body split into these chunks.
    pub fn chunked(chunks: &[&'static [u8]]) -> Self {
        Self {
            status: 200,
            headers: http::HeaderMap::new(),
            chunks: chunks.iter().map(|c| Bytes::from_static(c)).collect(),
            gate: None,
            failure: None,
        }
    }

    /// Fail in the transport instead of responding.
    pub fn failing(failure: fn() -> NetworkError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::ok("")
        }
    }

    /// Hold every request until the gate is opened.
    pub fn gated(mut self, gate: &Gate) -> Self {
        self.gate = Some(gate.0.clone());
        self
    }
}

/// Holds gated requests in flight.
#[derive(Clone)]
pub struct Gate(Arc<Semaphore>);

impl Gate {
    pub fn closed() -> Self {
        Self(Arc::new(Semaphore::new(0)))
    }

    pub fn open(&self, requests: usize) {
        self.0.add_permits(requests);
    }
}

/// A request as the transport saw it.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: http::HeaderMap,
    pub body: Bytes,
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<String, MockRoute>>,
    dispatched: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// In-process transport answering by URL path. Unknown paths get a 404.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, path: &str, route: MockRoute) -> &Self {
        self.state.routes.lock().insert(path.to_string(), route);
        self
    }

    pub fn dispatch_count(&self) -> usize {
        self.state.dispatched.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.state.requests.lock().last().cloned()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: RequestDescriptor) -> BoxFuture<'static, Result<TransportResponse>> {
        let state = self.state.clone();
        async move {
            state.dispatched.fetch_add(1, Ordering::SeqCst);
            let RequestDescriptor {
                method,
                url,
                headers,
                body,
                ..
            } = request;

            // Draining a streamed body drives upload progress.
            let body = match body {
                RequestBody::Empty => Bytes::new(),
                RequestBody::Bytes { data, .. } => data,
                RequestBody::Stream { mut stream, .. } => {
                    let mut buffer = Vec::new();
                    while let Some(chunk) = stream.next().await {
                        buffer.extend_from_slice(&chunk?);
                    }
                    Bytes::from(buffer)
                }
            };

            let route = state.routes.lock().get(url.path()).cloned();
            state.requests.lock().push(RecordedRequest {
                method,
                url: url.to_string(),
                headers,
                body,
            });

            let Some(route) = route else {
                return Ok(TransportResponse::from_bytes(404, http::HeaderMap::new(), "not found"));
            };

            if let Some(gate) = route.gate {
                let permit = gate
                    .acquire_owned()
                    .await
                    .map_err(|_| NetworkError::Connection("gate closed".into()))?;
                permit.forget();
            }
            if let Some(failure) = route.failure {
                return Err(failure());
            }

            let total: u64 = route.chunks.iter().map(|c| c.len() as u64).sum();
            let chunks: Vec<Result<Bytes>> = route.chunks.into_iter().map(Ok).collect();
            Ok(TransportResponse {
                status: route.status,
                headers: route.headers,
                content_length: Some(total),
                body: stream::iter(chunks).boxed(),
            })
        }
        .boxed()
    }
}

/// A reachability source driven by the test.
#[derive(Clone, Default)]
pub struct ManualSource {
    sink: Arc<Mutex<Option<ConnectivitySink>>>,
}

impl ManualSource {
    pub fn emit(&self, status: ReachabilityStatus) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink(status);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.sink.lock().is_some()
    }
}

struct Detach(Arc<Mutex<Option<ConnectivitySink>>>);

impl Drop for Detach {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

impl ConnectivitySource for ManualSource {
    fn start(&self, sink: ConnectivitySink) -> Result<SourceGuard> {
        *self.sink.lock() = Some(sink);
        Ok(SourceGuard::new(Detach(self.sink.clone())))
    }
}

pub fn test_config(cache_dir: &std::path::Path) -> NetworkConfig {
    NetworkConfig::default()
        .with_base_url(BASE_URL)
        .with_cache_dir(cache_dir)
}

pub fn manager(transport: &MockTransport, cache_dir: &std::path::Path) -> NetworkManager {
    manager_with(transport, test_config(cache_dir))
}

/// Route crate logs to the test output; `RUST_LOG` is not consulted.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn manager_with(transport: &MockTransport, config: NetworkConfig) -> NetworkManager {
    init_tracing();
    NetworkManager::builder(config)
        .transport(transport.clone())
        .connectivity_source(ManualSource::default())
        .build()
        .expect("manager should build")
}

/// Poll `condition` until it holds or a second passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Let spawned request tasks reach their gates.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
