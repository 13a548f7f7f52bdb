//! Cooperative shutdown signal for the scheduler loop.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

#[derive(Debug, Default)]
struct Inner {
    triggered: AtomicBool,
    reason: RwLock<Option<String>>,
    notify: Notify,
}

/// A cloneable shutdown token.
///
/// Triggering is idempotent; only the first reason is kept.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    /// Creates an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown and wakes every waiter.
    pub fn trigger(&self, reason: impl Into<String>) {
        if self
            .inner
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let reason = reason.into();
            info!(reason = %reason, "shutdown requested");
            *self.inner.reason.write() = Some(reason);
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns whether shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Returns the shutdown reason, if triggered.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    /// Completes once shutdown has been requested.
    pub async fn wait(&self) {
        let notified = self.inner.notify.notified();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }

    /// Triggers this token when the process receives Ctrl-C.
    pub fn trigger_on_ctrl_c(&self) {
        let token = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.trigger("ctrl-c");
            }
        });
    }
}
