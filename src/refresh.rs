//! Single-slot refresh task management.
//!
//! The watcher triggers a refresh on every tick; a slow gh invocation must
//! never overlap the next one, so triggering a refresh first cancels the
//! previous in-flight task. At most one refresh runs at any time.

use std::future::Future;

use tokio::task::JoinHandle;

/// Owns at most one in-flight refresh task.
#[derive(Debug, Default)]
pub struct Refresher {
    current: Option<JoinHandle<()>>,
}

impl Refresher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new refresh, aborting the previous one if it is still
    /// running.
    pub fn trigger<F>(&mut self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.abort();
        self.current = Some(tokio::spawn(fut));
    }

    /// Cancels the in-flight refresh, if any.
    pub fn abort(&mut self) {
        if let Some(handle) = self.current.take() {
            if !handle.is_finished() {
                tracing::debug!("cancelling in-flight refresh");
            }
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.current.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Waits for the current refresh to finish. Cancellation of the awaited
    /// task is not an error.
    pub async fn wait(&mut self) {
        if let Some(handle) = self.current.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        self.abort();
    }
}
