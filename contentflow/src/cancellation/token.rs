//! Cancellation token for cooperative cancellation.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A token for cooperative cancellation of a pipeline run.
///
/// The orchestrator checks the token at level boundaries and forwards it to
/// every stage call so in-flight work can abort. Cancellation is idempotent:
/// only the first reason is kept.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    notify: Notify,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason and wakes waiters of [`Self::cancelled`].
    ///
    /// The reason is stored before the flag is raised, so a cancelled token
    /// always reports its reason.
    pub fn cancel(&self, reason: impl Into<String>) {
        let mut slot = self.reason.write();
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        *slot = Some(reason.into());
        self.cancelled.store(true, Ordering::SeqCst);
        drop(slot);

        self.notify.notify_waiters();
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Returns the cancellation reason, or a generic one.
    #[must_use]
    pub fn reason_or_default(&self) -> String {
        self.reason().unwrap_or_else(|| "cancelled".to_string())
    }

    /// Completes once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            // Created before the check so a concurrent `cancel` cannot be missed.
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
