//! Integration tests for reachability monitoring through the manager.

mod common;

use std::sync::Arc;

use parking_lot::Mutex;

use common::{ManualSource, MockTransport, test_config};
use horizon_lattice_http::{NetworkManager, ReachabilityStatus};

fn manager_with_source(source: &ManualSource, dir: &std::path::Path) -> NetworkManager {
    NetworkManager::builder(test_config(dir))
        .transport(MockTransport::new())
        .connectivity_source(source.clone())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_every_event_reaches_subscribers() {
    let dir = tempfile::tempdir().unwrap();
    let source = ManualSource::default();
    let manager = manager_with_source(&source, dir.path());
    assert_eq!(manager.reachability_status(), ReachabilityStatus::Unknown);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    manager
        .start_monitoring(move |status| sink.lock().push(status))
        .unwrap();
    assert!(source.is_attached());

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
    assert_eq!(manager.reachability_status(), ReachabilityStatus::ReachableWiFi);
    assert!(manager.reachability().is_reachable());
}

#[tokio::test]
async fn test_second_subscriber_shares_source() {
    let dir = tempfile::tempdir().unwrap();
    let source = ManualSource::default();
    let manager = manager_with_source(&source, dir.path());

    let first = Arc::new(Mutex::new(0));
    let second = Arc::new(Mutex::new(0));
    let (a, b) = (first.clone(), second.clone());
    let id = manager.start_monitoring(move |_| *a.lock() += 1).unwrap();
    manager.start_monitoring(move |_| *b.lock() += 1).unwrap();
    assert_eq!(manager.reachability().subscriber_count(), 2);

    source.emit(ReachabilityStatus::ReachableCellular);
    assert!(manager.reachability().unsubscribe(id));
    source.emit(ReachabilityStatus::NotReachable);

    assert_eq!(*first.lock(), 1);
    assert_eq!(*second.lock(), 2);
}

#[tokio::test]
async fn test_panicking_subscriber_does_not_block_others() {
    let dir = tempfile::tempdir().unwrap();
    let source = ManualSource::default();
    let manager = manager_with_source(&source, dir.path());

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = delivered.clone();
    manager
        .start_monitoring(|_| panic!("subscriber failure"))
        .unwrap();
    manager
        .start_monitoring(move |status| sink.lock().push(status))
        .unwrap();

    source.emit(ReachabilityStatus::ReachableWiFi);
    source.emit(ReachabilityStatus::NotReachable);

    assert_eq!(delivered.lock().len(), 2);
}

#[tokio::test]
async fn test_stop_detaches_source_and_subscribers() {
    let dir = tempfile::tempdir().unwrap();
    let source = ManualSource::default();
    let manager = manager_with_source(&source, dir.path());

    let count = Arc::new(Mutex::new(0));
    let sink = count.clone();
    manager.start_monitoring(move |_| *sink.lock() += 1).unwrap();
    source.emit(ReachabilityStatus::ReachableWiFi);

    manager.stop_monitoring();
    assert!(!source.is_attached());
    assert!(!manager.reachability().is_running());
    assert_eq!(manager.reachability().subscriber_count(), 0);

    source.emit(ReachabilityStatus::NotReachable);
    assert_eq!(*count.lock(), 1);
}
