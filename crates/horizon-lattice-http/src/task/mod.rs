//! In-flight request tracking and cancellation.

mod handle;
mod registry;

pub use handle::{TaskHandle, TaskId, TaskState};
pub use registry::{DuplicatePolicy, TaskRegistry};
