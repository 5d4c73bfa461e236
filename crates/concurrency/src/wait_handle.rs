//! One-shot wait handles
//!
//! A `WaitHandle` is the result of reading a key from a `KeyedFutureStore`.
//! It moves from pending to resolved at most once; the transition is claimed
//! with a compare-and-set, so a second `resolve` is a no-op rather than a
//! second delivery.
//!
//! The same handle can be consumed three ways:
//! - `.await` from async code (it implements `Future`)
//! - `wait()` / `wait_timeout()` from a plain thread
//! - `on_resolved()` callbacks, each run exactly once
//!
//! Clones share state. Dropping every caller-side clone abandons the wait
//! without affecting other waiters for the same key.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

type Callback<V> = Box<dyn FnOnce(&V) + Send>;

struct Shared<V> {
    /// Claimed by the first `resolve`, never released
    claimed: AtomicBool,
    state: Mutex<State<V>>,
    ready: Condvar,
}

struct State<V> {
    value: Option<V>,
    wakers: Vec<Waker>,
    callbacks: Vec<Callback<V>>,
}

/// Handle to a value that may not have been written yet
pub struct WaitHandle<V> {
    shared: Arc<Shared<V>>,
}

impl<V> Clone for WaitHandle<V> {
    fn clone(&self) -> Self {
        WaitHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V: Clone> WaitHandle<V> {
    /// Create an unresolved handle
    pub(crate) fn pending() -> Self {
        WaitHandle {
            shared: Arc::new(Shared {
                claimed: AtomicBool::new(false),
                state: Mutex::new(State {
                    value: None,
                    wakers: Vec::new(),
                    callbacks: Vec::new(),
                }),
                ready: Condvar::new(),
            }),
        }
    }

    /// Create a handle that is already resolved with `value`
    pub fn resolved(value: V) -> Self {
        let handle = Self::pending();
        handle.resolve(value);
        handle
    }

    /// Deliver `value` to everything waiting on this handle
    ///
    /// Returns `true` if this call performed the transition. Later calls
    /// return `false` and drop their value.
    pub(crate) fn resolve(&self, value: V) -> bool {
        if self
            .shared
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let (delivered, wakers, callbacks) = {
            let mut state = self.shared.state.lock();
            let delivered = value.clone();
            state.value = Some(value);
            (
                delivered,
                std::mem::take(&mut state.wakers),
                std::mem::take(&mut state.callbacks),
            )
        };
        self.shared.ready.notify_all();

        // Outside the lock: callbacks may read this handle again.
        for waker in wakers {
            waker.wake();
        }
        for callback in callbacks {
            callback(&delivered);
        }
        true
    }

    /// True once a value has been delivered
    pub fn is_resolved(&self) -> bool {
        self.shared.state.lock().value.is_some()
    }

    /// The delivered value, without waiting
    pub fn try_value(&self) -> Option<V> {
        self.shared.state.lock().value.clone()
    }

    /// Block the current thread until a value is delivered
    ///
    /// Never returns if the key is never written.
    pub fn wait(&self) -> V {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(value) = &state.value {
                return value.clone();
            }
            self.shared.ready.wait(&mut state);
        }
    }

    /// Block until a value is delivered or `timeout` elapses
    ///
    /// Timing out abandons nothing: the handle can still be waited on again.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<V> {
        let deadline = match Instant::now().checked_add(timeout) {
            Some(deadline) => deadline,
            None => return Some(self.wait()),
        };
        let mut state = self.shared.state.lock();
        loop {
            if let Some(value) = &state.value {
                return Some(value.clone());
            }
            if self.shared.ready.wait_until(&mut state, deadline).timed_out() {
                return state.value.clone();
            }
        }
    }

    /// Run `callback` once with the delivered value
    ///
    /// Runs immediately on the calling thread if the handle is already
    /// resolved, otherwise on the thread that resolves it.
    pub fn on_resolved<F>(&self, callback: F)
    where
        F: FnOnce(&V) + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        match &state.value {
            Some(value) => {
                let value = value.clone();
                drop(state);
                callback(&value);
            }
            None => state.callbacks.push(Box::new(callback)),
        }
    }
}

impl<V> WaitHandle<V> {
    /// True when nothing can observe this handle's resolution any more
    ///
    /// That is: no caller holds a clone and no `on_resolved` callback is
    /// queued. Only meaningful for the copy the store keeps in its waiter
    /// list.
    pub(crate) fn is_abandoned(&self) -> bool {
        Arc::strong_count(&self.shared) == 1 && self.shared.state.lock().callbacks.is_empty()
    }
}

impl<V: Clone> WaitHandle<V> {
    fn poll_value(&self, cx: &mut Context<'_>) -> Poll<V> {
        let mut state = self.shared.state.lock();
        if let Some(value) = &state.value {
            return Poll::Ready(value.clone());
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<V: Clone> Future for WaitHandle<V> {
    type Output = V;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<V> {
        self.poll_value(cx)
    }
}

/// Awaiting a borrowed handle leaves it usable afterwards.
impl<V: Clone> Future for &WaitHandle<V> {
    type Output = V;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<V> {
        self.poll_value(cx)
    }
}

impl<V: fmt::Debug> fmt::Debug for WaitHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("WaitHandle")
            .field("value", &state.value)
            .field("wakers", &state.wakers.len())
            .field("callbacks", &state.callbacks.len())
            .finish()
    }
}
