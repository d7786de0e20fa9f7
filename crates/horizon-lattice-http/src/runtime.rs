//! Runtime selection for request tasks.
//!
//! Requests run on the tokio runtime the manager was built inside. When the
//! manager is created from synchronous code, a small process-wide runtime is
//! started on first use.

use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::error::{NetworkError, Result};

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Get the process-wide runtime, starting it if needed.
pub fn global() -> Result<&'static Runtime> {
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime);
    }
    let runtime = Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("lattice-http")
        .enable_all()
        .build()
        .map_err(|e| NetworkError::Config(format!("failed to start tokio runtime: {e}")))?;
    // A concurrent initializer may have won; its runtime is kept and ours dropped.
    Ok(RUNTIME.get_or_init(|| runtime))
}

/// Handle of the ambient runtime, or of the process-wide one outside tokio.
pub fn handle() -> Result<Handle> {
    match Handle::try_current() {
        Ok(handle) => Ok(handle),
        Err(_) => Ok(global()?.handle().clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_outside_tokio_uses_global() {
        let handle = handle().unwrap();
        let value = handle.block_on(async { 21 * 2 });
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_handle_inside_tokio_is_current() {
        let handle = handle().unwrap();
        let joined = handle.spawn(async { 7 }).await.unwrap();
        assert_eq!(joined, 7);
    }
}
