//! A minimal thread-safe signal for fan-out notifications.
//!
//! Slots are invoked directly on the emitting thread, outside the connection
//! lock, so a slot may connect or disconnect other slots (or itself) while
//! being called. A panicking slot is caught and logged; the remaining slots
//! still receive the emission.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;

new_key_type! {
    /// A unique identifier for a connected slot.
    ///
    /// Use this ID to disconnect the slot via [`Signal::disconnect`].
    pub struct ConnectionId;
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// A type-safe signal that can have multiple connected slots.
pub struct Signal<Args> {
    connections: Mutex<SlotMap<ConnectionId, Slot<Args>>>,
}

impl<Args> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Connect a slot to this signal.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connections.lock().insert(Arc::new(slot))
    }

    /// Disconnect a slot by its connection ID.
    ///
    /// Returns `true` if the connection was found and removed.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Disconnect all slots.
    pub fn disconnect_all(&self) {
        self.connections.lock().clear();
    }

    /// Get the number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Invoke every connected slot with `args`.
    ///
    /// Returns the number of slots that completed without panicking.
    pub fn emit(&self, args: &Args) -> usize {
        let slots: Vec<(ConnectionId, Slot<Args>)> = self
            .connections
            .lock()
            .iter()
            .map(|(id, slot)| (id, slot.clone()))
            .collect();

        let mut delivered = 0;
        for (id, slot) in slots {
            match catch_unwind(AssertUnwindSafe(|| slot(args))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    tracing::error!(
                        target: targets::SIGNAL,
                        connection = ?id,
                        panic = panic_message(payload.as_ref()),
                        "slot panicked"
                    );
                }
            }
        }
        delivered
    }
}

impl<Args> std::fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("connections", &self.connection_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_to_all_slots() {
        let signal = Signal::<u32>::new();
        let sum = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let sum = sum.clone();
            signal.connect(move |n| {
                sum.fetch_add(*n as usize, Ordering::SeqCst);
            });
        }

        assert_eq!(signal.emit(&2), 3);
        assert_eq!(sum.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_disconnect() {
        let signal = Signal::<()>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = signal.connect(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        signal.emit(&());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_slot_is_isolated() {
        let signal = Signal::<()>::new();
        let count = Arc::new(AtomicUsize::new(0));

        signal.connect(|_| panic!("boom"));
        let c = count.clone();
        signal.connect(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(signal.emit(&()), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_slot_may_disconnect_during_emit() {
        let signal = Arc::new(Signal::<()>::new());
        let weak = Arc::downgrade(&signal);
        signal.connect(move |_| {
            if let Some(signal) = weak.upgrade() {
                signal.disconnect_all();
            }
        });

        signal.emit(&());
        assert_eq!(signal.connection_count(), 0);
    }
}
