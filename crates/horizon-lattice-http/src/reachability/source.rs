//! Platform connectivity sources.

use std::any::Any;
use std::sync::Arc;

use super::ReachabilityStatus;
use crate::error::{NetworkError, Result};
use crate::logging::targets;

/// Receives status events from a [`ConnectivitySource`].
pub type ConnectivitySink = Arc<dyn Fn(ReachabilityStatus) + Send + Sync>;

/// Keeps a started source alive. Dropping it stops the source.
pub struct SourceGuard {
    _inner: Box<dyn Any + Send>,
}

impl SourceGuard {
    /// Wrap any value whose drop stops event delivery.
    pub fn new<T: Any + Send>(inner: T) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }

    /// A guard for sources with nothing to tear down.
    pub fn noop() -> Self {
        Self::new(())
    }
}

impl std::fmt::Debug for SourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceGuard").finish_non_exhaustive()
    }
}

/// A platform primitive that reports connectivity changes.
pub trait ConnectivitySource: Send + Sync {
    /// Start delivering status events to `sink` until the returned guard is
    /// dropped. Sources may deliver the current status immediately.
    fn start(&self, sink: ConnectivitySink) -> Result<SourceGuard>;
}

/// Connectivity source built on the operating system's interface list.
///
/// Interface changes are observed with `netwatcher`; on every change the
/// default route interface is classified with `netdev`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NetworkInterfaceSource;

impl NetworkInterfaceSource {
    /// Create the source.
    pub fn new() -> Self {
        Self
    }

    /// Classify the current default interface.
    pub fn current_status() -> ReachabilityStatus {
        match netdev::get_default_interface() {
            Ok(iface) => {
                if iface.is_loopback() {
                    return ReachabilityStatus::NotReachable;
                }
                let has_addresses = !iface.ipv4.is_empty() || !iface.ipv6.is_empty();
                classify_interface(&iface.name, iface.is_up(), has_addresses)
            }
            Err(e) => {
                tracing::trace!(target: targets::REACHABILITY, error = %e, "no default interface");
                ReachabilityStatus::NotReachable
            }
        }
    }
}

impl ConnectivitySource for NetworkInterfaceSource {
    fn start(&self, sink: ConnectivitySink) -> Result<SourceGuard> {
        sink(Self::current_status());

        let handle = netwatcher::watch_interfaces(move |_update| {
            sink(Self::current_status());
        })
        .map_err(|e| NetworkError::Reachability(e.to_string()))?;

        Ok(SourceGuard::new(handle))
    }
}

const CELLULAR_PREFIXES: &[&str] = &["rmnet", "wwan", "pdp_ip", "ccmni"];

/// Map an interface to a reachability status.
///
/// WWAN interface names map to cellular. Any other working interface
/// (wireless or wired) counts as WiFi-class reachability.
pub fn classify_interface(name: &str, is_up: bool, has_addresses: bool) -> ReachabilityStatus {
    if !is_up || !has_addresses {
        return ReachabilityStatus::NotReachable;
    }
    let name = name.to_ascii_lowercase();
    if CELLULAR_PREFIXES.iter().any(|p| name.starts_with(p)) {
        ReachabilityStatus::ReachableCellular
    } else {
        ReachabilityStatus::ReachableWiFi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_interface() {
        assert_eq!(
            classify_interface("wlan0", true, true),
            ReachabilityStatus::ReachableWiFi
        );
        assert_eq!(
            classify_interface("rmnet_data0", true, true),
            ReachabilityStatus::ReachableCellular
        );
        assert_eq!(
            classify_interface("pdp_ip0", true, true),
            ReachabilityStatus::ReachableCellular
        );
        assert_eq!(
            classify_interface("eth0", true, true),
            ReachabilityStatus::ReachableWiFi
        );
        assert_eq!(
            classify_interface("wlan0", false, true),
            ReachabilityStatus::NotReachable
        );
        assert_eq!(
            classify_interface("eth0", true, false),
            ReachabilityStatus::NotReachable
        );
    }

    #[test]
    fn test_noop_guard() {
        let guard = SourceGuard::noop();
        drop(guard);
    }
}
