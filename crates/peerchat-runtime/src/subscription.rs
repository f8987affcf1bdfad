//! Subscription handles
//!
//! Every event subscription runs as its own spawned pump task. The returned
//! handle owns that task: cancelling or dropping it stops delivery.

use std::future::Future;

use tokio::task::AbortHandle;
use tracing::trace;

/// Owns the pump task behind one event subscription
#[derive(Debug)]
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    label: String,
    handle: AbortHandle,
    detached: bool,
}

impl Subscription {
    /// Spawn `pump` on the current runtime and tie its lifetime to the handle
    pub(crate) fn spawn<F>(label: impl Into<String>, pump: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let label = label.into();
        trace!("Subscribing {}", label);
        let handle = tokio::spawn(pump).abort_handle();
        Self {
            label,
            handle,
            detached: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// True once the pump ran out of events or was cancelled
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop delivering events
    pub fn cancel(self) {
        drop(self)
    }

    /// Let the pump run until its event source ends on its own
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.detached {
            trace!("Cancelling {}", self.label);
            self.handle.abort();
        }
    }
}
