//! Task handles.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::registry::RegistryInner;

/// Unique identifier for one registration in the task registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw identifier.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Lifecycle state of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// The request is in flight.
    Pending,
    /// The request finished (successfully or not).
    Completed,
    /// The request was cancelled.
    Cancelled,
}

/// A handle to a request.
///
/// Clones share state: cancelling through any clone, through
/// [`NetworkManager::cancel`](crate::NetworkManager::cancel) or via
/// `cancel_all` is observed by all of them.
#[derive(Clone)]
pub struct TaskHandle {
    key: Arc<str>,
    id: TaskId,
    state: Arc<Mutex<TaskState>>,
    registry: Weak<RegistryInner>,
}

impl TaskHandle {
    pub(super) fn registered(key: Arc<str>, id: TaskId, registry: Weak<RegistryInner>) -> Self {
        Self {
            key,
            id,
            state: Arc::new(Mutex::new(TaskState::Pending)),
            registry,
        }
    }

    /// A handle that was never registered and is already finished.
    ///
    /// Returned for cache hits and for requests rejected before dispatch.
    pub fn completed(key: impl Into<Arc<str>>) -> Self {
        Self {
            key: key.into(),
            id: TaskId::new(),
            state: Arc::new(Mutex::new(TaskState::Completed)),
            registry: Weak::new(),
        }
    }

    /// The task key (the resolved URL unless an explicit key was given).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The registration id.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    /// Check if the request is still in flight.
    pub fn is_pending(&self) -> bool {
        self.state() == TaskState::Pending
    }

    /// Check if the request was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    /// Cancel the request.
    ///
    /// Returns `true` if this call cancelled it, `false` if the request had
    /// already finished, was already cancelled, or was replaced.
    pub fn cancel(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.cancel_registration(&self.key, self.id),
            None => false,
        }
    }

    /// Whether this handle was never registered (cache hits, early failures).
    pub(crate) fn is_detached(&self) -> bool {
        self.registry.strong_count() == 0
    }

    /// Move from `Pending` to `to`. Terminal states are sticky.
    pub(super) fn transition(&self, to: TaskState) {
        let mut state = self.state.lock();
        if *state == TaskState::Pending {
            *state = to;
        }
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
