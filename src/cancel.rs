//! Cancellation tokens for blocking waits.
//!
//! Every rank thread owns a [`CancelToken`]. A blocking wait registers itself
//! with the token of its rank; [`CancelToken::cancel`], called from any
//! thread, sets the flag and wakes the registered waiter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Something blocked on its own condition variable that can be woken up.
pub(crate) trait Interrupt: Send + Sync {
    /// Wake all waiters so that they re-check their cancellation token.
    fn interrupt(&self);
}

struct TokenInner {
    cancelled: AtomicBool,
    waiter: Mutex<Option<Arc<dyn Interrupt>>>,
}

/// Cloneable cancellation flag shared between a rank thread and its driver.
///
/// # Example
///
/// ```
/// use mprt::CancelToken;
///
/// let token = CancelToken::new();
/// let remote = token.clone();
/// remote.cancel();
/// assert!(token.is_cancelled());
/// token.reset();
/// assert!(!remote.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        CancelToken {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                waiter: Mutex::new(None),
            }),
        }
    }

    /// Request cancellation and wake the waiter currently registered, if any.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let waiter = self.inner.waiter.lock().clone();
        if let Some(waiter) = waiter {
            waiter.interrupt();
        }
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the cancellation flag.
    pub fn reset(&self) {
        self.inner.cancelled.store(false, Ordering::SeqCst);
    }

    /// Register `waiter` until the returned guard is dropped.
    ///
    /// Must be called before the waiter checks the flag. `cancel` only holds
    /// the token lock while cloning the waiter, never while calling it.
    pub(crate) fn register(&self, waiter: Arc<dyn Interrupt>) -> Registration<'_> {
        *self.inner.waiter.lock() = Some(waiter);
        Registration { token: self }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        CancelToken::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Keeps a waiter registered with a token.
pub(crate) struct Registration<'a> {
    token: &'a CancelToken,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        *self.token.inner.waiter.lock() = None;
    }
}
