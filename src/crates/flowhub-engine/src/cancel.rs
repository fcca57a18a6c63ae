//! Cooperative cancellation token
//!
//! Cancellation becomes observable at the next suspension point of
//! whoever holds a clone of the token. Deadline exhaustion reuses the
//! same mechanism with a distinguished cause.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Why a cancellation was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// Explicit cancel request from a user or shutdown
    Requested,
    /// The run deadline elapsed
    DeadlineElapsed,
}

const CAUSE_NONE: u8 = 0;
const CAUSE_REQUESTED: u8 = 1;
const CAUSE_DEADLINE: u8 = 2;

/// Shared cancellation flag with async waiting
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    cause: Arc<AtomicU8>,
    notify: Arc<Notify>,
}

impl CancelToken {
    /// Create a fresh, un-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; idempotent, first cause wins
    pub fn cancel(&self, cause: CancelCause) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            let code = match cause {
                CancelCause::Requested => CAUSE_REQUESTED,
                CancelCause::DeadlineElapsed => CAUSE_DEADLINE,
            };
            self.cause.store(code, Ordering::SeqCst);
            self.notify.notify_waiters();
        }
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The recorded cause, when cancelled
    pub fn cause(&self) -> Option<CancelCause> {
        match self.cause.load(Ordering::SeqCst) {
            CAUSE_REQUESTED => Some(CancelCause::Requested),
            CAUSE_DEADLINE => Some(CancelCause::DeadlineElapsed),
            _ => None,
        }
    }

    /// Wait until cancellation is requested
    ///
    /// Returns immediately when already cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        // Register the waiter before re-checking to close the race with
        // a concurrent notify_waiters call
        let mut notified = std::pin::pin!(self.notify.notified());
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
