//! Logging conventions.
//!
//! The crate logs through [`tracing`] and never installs a subscriber. Each
//! subsystem uses its own target so applications can filter them, e.g.
//! `RUST_LOG=horizon_lattice_http::cache=debug`.
//!
//! Request/response summaries are logged at `info` only when
//! [`NetworkConfig::log_enabled`](crate::NetworkConfig::log_enabled) is set.

/// Tracing targets used by this crate.
pub mod targets {
    /// Disk cache activity.
    pub const CACHE: &str = "horizon_lattice_http::cache";
    /// Task registration and cancellation.
    pub const TASK: &str = "horizon_lattice_http::task";
    /// Request lifecycle.
    pub const MANAGER: &str = "horizon_lattice_http::manager";
    /// Reachability events.
    pub const REACHABILITY: &str = "horizon_lattice_http::reachability";
    /// Multipart encoding.
    pub const UPLOAD: &str = "horizon_lattice_http::upload";
    /// Subscriber notification.
    pub const SIGNAL: &str = "horizon_lattice_http::signal";
    /// Transport engine.
    pub const TRANSPORT: &str = "horizon_lattice_http::transport";
}
