//! Cooperative cancellation
//!
//! A `CancelSignal` is a shared flag polled at safe points: between items of a
//! bulk write, once per streamed item, at entry of `clear`. Setting it never
//! interrupts work already in progress and never undoes applied changes.
//!
//! Clones share state, so a signal can be handed to a factory closure that
//! decides to stop the very call it is running inside. A [`child`] fires
//! with its parent but can also be cancelled alone, which lets a call mix
//! its caller's signal with a veto of its own.
//!
//! [`child`]: CancelSignal::child

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.notify.notify_waiters();
        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// Shared cooperative cancellation flag
///
/// # Example
///
/// ```
/// use keyed_core::CancelSignal;
///
/// let signal = CancelSignal::new();
/// let observer = signal.clone();
/// assert!(!observer.is_cancelled());
/// signal.cancel();
/// assert!(observer.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<Inner>,
}

impl CancelSignal {
    /// Create a signal that has not fired
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    ///
    /// Idempotent. Wakes every task parked in [`CancelSignal::cancelled`]
    /// and cancels every live child.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Create a signal that fires whenever this one does
    ///
    /// Cancelling the child leaves this signal untouched.
    pub fn child(&self) -> CancelSignal {
        let child = CancelSignal::new();
        {
            let mut children = self.inner.children.lock();
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        // Covers a `cancel` that drained the list before the push.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// True once `cancel` has been called on this signal or any clone
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolve once the signal fires
    ///
    /// Used to race lock acquisition against cancellation.
    pub async fn cancelled(&self) {
        loop {
            // Register before re-checking the flag so a concurrent `cancel`
            // between the check and the await is not lost.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
