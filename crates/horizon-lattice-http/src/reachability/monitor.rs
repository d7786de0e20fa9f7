//! Reachability monitor.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::ReachabilityStatus;
use super::source::{ConnectivitySink, ConnectivitySource, SourceGuard};
use crate::error::Result;
use crate::logging::targets;
use crate::signal::{ConnectionId, Signal};

/// Identifies a reachability subscription.
pub type SubscriptionId = ConnectionId;

struct MonitorInner {
    status: Mutex<ReachabilityStatus>,
    subscribers: Signal<ReachabilityStatus>,
    guard: Mutex<Option<SourceGuard>>,
}

impl MonitorInner {
    fn notify(&self, status: ReachabilityStatus) {
        let previous = std::mem::replace(&mut *self.status.lock(), status);
        tracing::debug!(
            target: targets::REACHABILITY,
            %previous,
            %status,
            "reachability changed"
        );
        self.subscribers.emit(&status);
    }
}

/// Tracks connectivity and fans status events out to subscribers.
///
/// Every event from the source is forwarded, including repeats of the same
/// status. Subscribers run on the thread that delivered the event, outside
/// any lock; a panicking subscriber does not affect the others.
///
/// # Example
///
/// ```ignore
/// use horizon_lattice_http::reachability::{ReachabilityMonitor, NetworkInterfaceSource};
///
/// let monitor = ReachabilityMonitor::new();
/// monitor.subscribe(|status| println!("network is now {status}"));
/// monitor.start(&NetworkInterfaceSource::new())?;
/// ```
#[derive(Clone)]
pub struct ReachabilityMonitor {
    inner: Arc<MonitorInner>,
}

impl Default for ReachabilityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ReachabilityMonitor {
    /// Create a stopped monitor with status `Unknown`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                status: Mutex::new(ReachabilityStatus::Unknown),
                subscribers: Signal::new(),
                guard: Mutex::new(None),
            }),
        }
    }

    /// Register a callback for status events.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(ReachabilityStatus) + Send + Sync + 'static,
    {
        self.inner.subscribers.connect(move |status| callback(*status))
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.disconnect(id)
    }

    /// Number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.connection_count()
    }

    /// The most recently reported status.
    pub fn status(&self) -> ReachabilityStatus {
        *self.inner.status.lock()
    }

    /// Whether the network is currently reachable.
    pub fn is_reachable(&self) -> bool {
        self.status().is_reachable()
    }

    /// Whether a source is attached.
    pub fn is_running(&self) -> bool {
        self.inner.guard.lock().is_some()
    }

    /// Attach a connectivity source. Does nothing if already running.
    pub fn start(&self, source: &dyn ConnectivitySource) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);
        let sink: ConnectivitySink = Arc::new(move |status| {
            if let Some(inner) = weak.upgrade() {
                inner.notify(status);
            }
        });

        let guard = source.start(sink)?;
        let mut slot = self.inner.guard.lock();
        if slot.is_none() {
            *slot = Some(guard);
            tracing::debug!(target: targets::REACHABILITY, "monitoring started");
        }
        Ok(())
    }

    /// Detach the source and drop all subscribers.
    pub fn stop(&self) {
        let guard = self.inner.guard.lock().take();
        drop(guard);
        self.inner.subscribers.disconnect_all();
        tracing::debug!(target: targets::REACHABILITY, "monitoring stopped");
    }

    /// Deliver a status event, as a source would.
    pub fn notify(&self, status: ReachabilityStatus) {
        self.inner.notify(status);
    }
}

impl std::fmt::Debug for ReachabilityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReachabilityMonitor")
            .field("status", &self.status())
            .field("running", &self.is_running())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// A source that records its sink so tests can drive events.
    #[derive(Default)]
    struct ManualSource {
        sink: Mutex<Option<ConnectivitySink>>,
        stopped: Arc<AtomicBool>,
    }

    struct StopFlag(Arc<AtomicBool>);

    impl Drop for StopFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    impl ManualSource {
        fn emit(&self, status: ReachabilityStatus) {
            let sink = self.sink.lock().clone();
            if let Some(sink) = sink {
                sink(status);
            }
        }
    }

    impl ConnectivitySource for ManualSource {
        fn start(&self, sink: ConnectivitySink) -> Result<SourceGuard> {
            *self.sink.lock() = Some(sink);
            Ok(SourceGuard::new(StopFlag(self.stopped.clone())))
        }
    }

    #[test]
    fn test_every_event_is_delivered() {
        let monitor = ReachabilityMonitor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        monitor.subscribe(move |status| s.lock().push(status));

        let source = ManualSource::default();
        monitor.start(&source).unwrap();
        source.emit(ReachabilityStatus::NotReachable);
        source.emit(ReachabilityStatus::ReachableWiFi);
        source.emit(ReachabilityStatus::ReachableWiFi);

        assert_eq!(
            *seen.lock(),
            vec![
                ReachabilityStatus::NotReachable,
                ReachabilityStatus::ReachableWiFi,
                ReachabilityStatus::ReachableWiFi,
            ]
        );
        assert_eq!(monitor.status(), ReachabilityStatus::ReachableWiFi);
        assert!(monitor.is_reachable());
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let monitor = ReachabilityMonitor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        monitor.subscribe(|_| panic!("subscriber failure"));
        let s = seen.clone();
        monitor.subscribe(move |status| s.lock().push(status));

        monitor.notify(ReachabilityStatus::ReachableCellular);
        assert_eq!(*seen.lock(), vec![ReachabilityStatus::ReachableCellular]);
    }

    #[test]
    fn test_unsubscribe() {
        let monitor = ReachabilityMonitor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let id = monitor.subscribe(move |status| s.lock().push(status));

        assert!(monitor.unsubscribe(id));
        assert!(!monitor.unsubscribe(id));
        monitor.notify(ReachabilityStatus::NotReachable);
        assert!(seen.lock().is_empty());
        assert_eq!(monitor.status(), ReachabilityStatus::NotReachable);
    }

    #[test]
    fn test_stop_releases_source_and_subscribers() {
        let monitor = ReachabilityMonitor::new();
        monitor.subscribe(|_| {});
        let source = ManualSource::default();

        monitor.start(&source).unwrap();
        assert!(monitor.is_running());
        // Starting again keeps the first source
        monitor.start(&source).unwrap();

        monitor.stop();
        assert!(!monitor.is_running());
        assert_eq!(monitor.subscriber_count(), 0);
        assert!(source.stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_initial_status_unknown() {
        let monitor = ReachabilityMonitor::new();
        assert_eq!(monitor.status(), ReachabilityStatus::Unknown);
        assert!(!monitor.is_reachable());
    }
}
