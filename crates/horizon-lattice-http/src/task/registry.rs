//! The in-flight request registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::oneshot;

use super::handle::{TaskHandle, TaskId, TaskState};
use crate::error::{NetworkError, Result};
use crate::logging::targets;

/// What happens when a request is registered under a key that is already in
/// flight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Fail the new request with [`NetworkError::DuplicateRequest`].
    #[default]
    Reject,
    /// Cancel the in-flight request and register the new one in its place.
    CancelAndReplace,
}

struct Entry {
    id: TaskId,
    cancel: oneshot::Sender<()>,
    handle: TaskHandle,
}

impl Entry {
    fn fire(self) {
        // The receiver is gone once the request finished on its own.
        let _ = self.cancel.send(());
        self.handle.transition(TaskState::Cancelled);
    }
}

pub(crate) struct RegistryInner {
    tasks: Mutex<HashMap<Arc<str>, Entry>>,
    policy: Mutex<DuplicatePolicy>,
}

impl RegistryInner {
    /// Cancel `key` only if it is still the registration `id`.
    pub(super) fn cancel_registration(&self, key: &str, id: TaskId) -> bool {
        let entry = {
            let mut tasks = self.tasks.lock();
            match tasks.get(key) {
                Some(entry) if entry.id == id => tasks.remove(key),
                _ => None,
            }
        };
        match entry {
            Some(entry) => {
                tracing::debug!(target: targets::TASK, key, "cancelled request");
                entry.fire();
                true
            }
            None => false,
        }
    }
}

/// Tracks in-flight requests by key so they can be cancelled.
///
/// At most one active registration exists per key. The map lock is held only
/// while the map is mutated; cancel signals are sent after it is released.
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(DuplicatePolicy::default())
    }
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                tasks: Mutex::new(HashMap::new()),
                policy: Mutex::new(policy),
            }),
        }
    }

    /// The current duplicate policy.
    pub fn policy(&self) -> DuplicatePolicy {
        *self.inner.policy.lock()
    }

    /// Change the duplicate policy for future registrations.
    pub fn set_policy(&self, policy: DuplicatePolicy) {
        *self.inner.policy.lock() = policy;
    }

    /// Register an in-flight request.
    ///
    /// `cancel` is fired when the request is cancelled through the registry
    /// or a handle.
    pub fn register(
        &self,
        key: impl Into<Arc<str>>,
        cancel: oneshot::Sender<()>,
    ) -> Result<TaskHandle> {
        let key = key.into();
        let policy = self.policy();
        let id = TaskId::new();
        let handle = TaskHandle::registered(key.clone(), id, Arc::downgrade(&self.inner));

        let replaced = {
            let mut tasks = self.inner.tasks.lock();
            if tasks.contains_key(&key) && policy == DuplicatePolicy::Reject {
                return Err(NetworkError::DuplicateRequest {
                    key: key.to_string(),
                });
            }
            tasks.insert(
                key.clone(),
                Entry {
                    id,
                    cancel,
                    handle: handle.clone(),
                },
            )
        };

        if let Some(previous) = replaced {
            tracing::debug!(
                target: targets::TASK,
                key = %key,
                "replacing in-flight request"
            );
            previous.fire();
        }

        tracing::trace!(target: targets::TASK, key = %key, id = id.as_u64(), "registered");
        Ok(handle)
    }

    /// Mark a registration as finished and remove it.
    ///
    /// Only removes the entry if it is still registration `id`, so a request
    /// that was replaced and finishes late never evicts its successor.
    /// Returns `false` if the registration had already been cancelled or
    /// replaced; the caller must then report the request as cancelled.
    pub fn complete(&self, key: &str, id: TaskId) -> bool {
        let entry = {
            let mut tasks = self.inner.tasks.lock();
            match tasks.get(key) {
                Some(entry) if entry.id == id => tasks.remove(key),
                _ => None,
            }
        };
        match entry {
            Some(entry) => {
                entry.handle.transition(TaskState::Completed);
                tracing::trace!(target: targets::TASK, key, id = id.as_u64(), "completed");
                true
            }
            None => false,
        }
    }

    /// Cancel the request registered under `key`.
    ///
    /// Returns `true` if a request was cancelled, `false` if none was in
    /// flight.
    pub fn cancel(&self, key: &str) -> bool {
        let entry = self.inner.tasks.lock().remove(key);
        match entry {
            Some(entry) => {
                tracing::debug!(target: targets::TASK, key, "cancelled request");
                entry.fire();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight request, returning how many were cancelled.
    ///
    /// Requests registered while this runs are not affected.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Entry> = {
            let mut tasks = self.inner.tasks.lock();
            tasks.drain().map(|(_, entry)| entry).collect()
        };
        let count = drained.len();
        for entry in drained {
            entry.fire();
        }
        if count > 0 {
            tracing::debug!(target: targets::TASK, count, "cancelled all requests");
        }
        count
    }

    /// Whether a request is in flight under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.tasks.lock().contains_key(key)
    }

    /// Number of in-flight requests.
    pub fn len(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// Whether no request is in flight.
    pub fn is_empty(&self) -> bool {
        self.inner.tasks.lock().is_empty()
    }

    /// Keys of the in-flight requests.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .tasks
            .lock()
            .keys()
            .map(|key| key.to_string())
            .collect()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("policy", &self.policy())
            .field("len", &self.len())
            .finish()
    }
}
