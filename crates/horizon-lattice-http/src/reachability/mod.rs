//! Network reachability monitoring.
//!
//! A [`ReachabilityMonitor`] receives events from a [`ConnectivitySource`]
//! and forwards each one to every subscriber.

mod monitor;
mod source;

pub use monitor::{ReachabilityMonitor, SubscriptionId};
pub use source::{
    ConnectivitySink, ConnectivitySource, NetworkInterfaceSource, SourceGuard, classify_interface,
};

/// Connectivity as seen by the platform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReachabilityStatus {
    /// No event has been received yet.
    #[default]
    Unknown,
    /// No route to the network.
    NotReachable,
    /// Reachable over a cellular (WWAN) link.
    ReachableCellular,
    /// Reachable over WiFi or another non-metered link.
    ReachableWiFi,
}

impl ReachabilityStatus {
    /// Whether the network can be reached.
    pub fn is_reachable(self) -> bool {
        matches!(self, Self::ReachableCellular | Self::ReachableWiFi)
    }
}

impl std::fmt::Display for ReachabilityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::NotReachable => write!(f, "not reachable"),
            Self::ReachableCellular => write!(f, "reachable via cellular"),
            Self::ReachableWiFi => write!(f, "reachable via WiFi"),
        }
    }
}
