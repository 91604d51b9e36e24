//! Per-session cancellation signal.
//!
//! One writer (the supervisor) and many readers (every adapter). Cooperative
//! adapters await [`CancellationController::signaled`] next to their
//! suspension points; the push callback reads [`is_signaled`] synchronously.
//!
//! [`is_signaled`]: CancellationController::is_signaled

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Observable state of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelState {
    Armed,
    Signaled,
}

struct Inner {
    signaled: AtomicBool,
    notify: Notify,
}

/// Shared cancellation signal. Clones observe the same flag.
#[derive(Clone)]
pub struct CancellationController {
    inner: Arc<Inner>,
}

impl CancellationController {
    /// A fresh, armed controller.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                signaled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Move to `Signaled` and wake every waiter.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn signal(&self) -> bool {
        let first = self
            .inner
            .signaled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    pub fn is_signaled(&self) -> bool {
        self.inner.signaled.load(Ordering::Acquire)
    }

    pub fn state(&self) -> CancelState {
        if self.is_signaled() {
            CancelState::Signaled
        } else {
            CancelState::Armed
        }
    }

    /// Resolve once the controller is signaled.
    pub async fn signaled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent signal is not missed
            notified.as_mut().enable();
            if self.is_signaled() {
                return;
            }
            notified.await;
        }
    }

    /// Drive `fut` until it completes or the controller is signaled.
    ///
    /// Returns `None` when cancellation won.
    pub async fn run_until_signaled<F: Future>(&self, fut: F) -> Option<F::Output> {
        if self.is_signaled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.signaled() => None,
            output = fut => Some(output),
        }
    }
}

impl Default for CancellationController {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationController")
            .field("state", &self.state())
            .finish()
    }
}
