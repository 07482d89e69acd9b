//! Tokio runtime management for synchronous operations

use crate::{Error, Result};
use std::sync::{Arc, OnceLock};
use tokio::runtime::Runtime;

static RUNTIME: OnceLock<Arc<Runtime>> = OnceLock::new();

/// Get or create the shared Tokio runtime that drives uploads.
///
/// Callers block on it from synchronous code; it must not be used from
/// inside another runtime's worker thread.
pub(crate) fn get_runtime() -> Result<Arc<Runtime>> {
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime.clone());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .thread_name("gs-fastcopy-worker")
        .build()
        .map_err(|e| Error::Runtime(format!("Failed to create Tokio runtime: {}", e)))?;

    // Another thread may have won the race; theirs is kept
    Ok(RUNTIME.get_or_init(|| Arc::new(runtime)).clone())
}
