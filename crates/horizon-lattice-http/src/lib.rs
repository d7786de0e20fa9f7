//! HTTP client facade for Horizon Lattice.
//!
//! This crate wraps an HTTP transport with everything application code
//! usually builds around it:
//!
//! - **Requests**: GET/POST/PUT/DELETE with JSON or form parameters
//! - **Response cache**: disk-backed, keyed by method, URL and parameters,
//!   with size-bounded eviction
//! - **Cancellation**: every in-flight request is registered by URL (or an
//!   explicit key) and can be cancelled from anywhere
//! - **Uploads**: multipart images (re-encoded), videos and files (streamed)
//! - **Downloads**: bodies streamed straight to disk
//! - **Reachability**: network status changes fanned out to subscribers
//!
//! # Quick start
//!
//! ```ignore
//! use horizon_lattice_http::{HttpMethod, NetworkConfig, NetworkManager};
//!
//! let manager = NetworkManager::new(
//!     NetworkConfig::default()
//!         .with_base_url("https://api.example.com")
//!         .with_cache_limit_mb(50),
//! )?;
//!
//! let items: Vec<Item> = manager
//!     .request(HttpMethod::Get, "/items")
//!     .parameter("page", 1)
//!     .cache(true)
//!     .send()?
//!     .await?
//!     .json()?;
//! ```
//!
//! # Callbacks
//!
//! Every request method also has a callback form that returns a
//! [`TaskHandle`] for cancellation:
//!
//! ```ignore
//! use horizon_lattice_http::{Parameters, RequestCallbacks};
//!
//! let handle = manager.download_file(
//!     "https://cdn.example.com/video.mp4",
//!     "/tmp/video.mp4",
//!     RequestCallbacks::new(
//!         |response| println!("saved to {:?}", response.saved_path()),
//!         |error| {
//!             if !error.is_cancelled() {
//!                 eprintln!("download failed: {error}");
//!             }
//!         },
//!     )
//!     .with_progress(|p| println!("{:?}%", p.percent())),
//! );
//!
//! // Later
//! handle.cancel();
//! ```
//!
//! Exactly one of the success and failure callbacks runs per request.
//! Callbacks may run on a runtime worker thread.

pub mod cache;
mod config;
mod error;
pub mod http;
pub mod logging;
mod manager;
pub mod reachability;
pub mod runtime;
mod signal;
pub mod task;
pub mod upload;

pub use config::{DEFAULT_TIMEOUT, NetworkConfig};
pub use error::{NetworkError, Result};
pub use signal::{ConnectionId, Signal};

// Re-export commonly used types at the crate root
pub use cache::{CacheKey, CacheStats};
pub use http::{
    HttpMethod, Parameters, ProgressCallback, RequestSerializerKind, ResponseSerializerKind,
    Response, Transport, TransportResponse, TransferProgress,
};
pub use manager::{NetworkManager, NetworkManagerBuilder, RequestCallbacks, RequestOptions, RequestTask};
pub use reachability::{ConnectivitySource, ReachabilityMonitor, ReachabilityStatus, SubscriptionId};
pub use task::{DuplicatePolicy, TaskHandle, TaskId, TaskState};
pub use upload::{ImageFormat, ImageUpload, UploadPart};
