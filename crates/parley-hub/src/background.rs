//! Tracking for detached work such as post-session summaries.
//!
//! Handles are kept so shutdown can wait for in-flight tasks instead of
//! dropping them with the runtime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Registry of spawned tasks, awaited on shutdown.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn a task and register its handle before returning.
    pub fn spawn<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut guard = self.handles();
        guard.retain(|h| !h.is_finished());
        guard.push(handle);
    }

    /// Wait for every registered task.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = std::mem::take(&mut *self.handles());
        let count = handles.len();
        if count == 0 {
            return;
        }

        info!(count, "Waiting for background tasks to complete");
        for (i, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                warn!(task = i, error = %e, "Background task panicked");
            }
        }
        info!("All background tasks completed");
    }

    /// Number of tasks still running.
    pub fn pending_count(&self) -> usize {
        let mut guard = self.handles();
        guard.retain(|h| !h.is_finished());
        guard.len()
    }
}
