//! Keyed future store
//!
//! A write-once map whose reads can run ahead of its writes. Reading a key
//! that has no value yet registers a pending [`WaitHandle`]; the `put` for
//! that key resolves every registered handle with the written value.
//!
//! # Locking
//!
//! - `entries`: RwLock. `put` takes it exclusively, `get` shares it.
//! - `pending`: Mutex, only ever taken while `entries` is held.
//!
//! `get` keeps the shared `entries` lock while it registers its waiter, so a
//! `put` for the same key either happens entirely before the presence check
//! (and the reader sees the value) or entirely after the registration (and
//! the writer finds the waiter). There is no window between the two.
//!
//! Waiters are detached from the table under the locks and resolved after
//! both are released, so callbacks can call back into the store.
//!
//! # Invariants
//!
//! - A key is never in `entries` and `pending` at the same time
//! - Each handle is resolved at most once
//! - A key is written at most once; a second `put` fails with `AlreadyPresent`

use crate::wait_handle::WaitHandle;
use keyed_core::{Error, Result, StoreConfig};
use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use tracing::{trace, warn};

/// Write-once keyed store whose reads wait for future writes
pub struct KeyedFutureStore<K, V> {
    entries: RwLock<HashMap<K, V>>,
    pending: Mutex<HashMap<K, Vec<WaitHandle<V>>>>,
    config: StoreConfig,
}

impl<K, V> KeyedFutureStore<K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Clone,
{
    /// Create an empty store with default configuration
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create an empty store with the given configuration
    pub fn with_config(config: StoreConfig) -> Self {
        KeyedFutureStore {
            entries: RwLock::new(HashMap::with_capacity(config.initial_capacity)),
            pending: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Create a store pre-populated with `entries`
    ///
    /// # Errors
    ///
    /// `AlreadyPresent` if `entries` repeats a key.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let store = Self::new();
        for (key, value) in entries {
            store.put(key, value)?;
        }
        Ok(store)
    }

    /// Configuration this store was built with
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Write `value` for `key` and wake everything waiting on it
    ///
    /// # Errors
    ///
    /// `AlreadyPresent` if `key` already holds a value. The stored value is
    /// left untouched.
    pub fn put(&self, key: K, value: V) -> Result<()> {
        let waiters = {
            let mut entries = self.entries.write();
            match entries.entry(key) {
                Entry::Occupied(occupied) => {
                    warn!(target: "keyed::future_store", key = ?occupied.key(), "Rejected second write to key");
                    return Err(Error::already_present(occupied.key()));
                }
                Entry::Vacant(vacant) => {
                    let waiters = self.pending.lock().remove(vacant.key()).unwrap_or_default();
                    trace!(
                        target: "keyed::future_store",
                        key = ?vacant.key(),
                        waiters = waiters.len(),
                        "Stored value"
                    );
                    vacant.insert(value.clone());
                    waiters
                }
            }
        };

        for waiter in waiters {
            waiter.resolve(value.clone());
        }
        Ok(())
    }

    /// Read `key`, now or whenever it gets written
    ///
    /// Returns an already-resolved handle if the key is present. Otherwise
    /// the returned handle resolves on the `put` for `key`; if no such `put`
    /// ever happens it never resolves. Callers needing a bound should wrap
    /// the handle in a timeout and drop it when the timeout fires.
    pub fn get(&self, key: &K) -> WaitHandle<V> {
        let entries = self.entries.read();
        if let Some(value) = entries.get(key) {
            return WaitHandle::resolved(value.clone());
        }

        // `entries` is still held shared: no `put` can land before the
        // waiter is registered.
        let mut pending = self.pending.lock();
        let waiters = pending.entry(key.clone()).or_default();
        if let Some(threshold) = self.config.prune_abandoned_threshold {
            if waiters.len() >= threshold {
                let before = waiters.len();
                waiters.retain(|w| !w.is_abandoned());
                let pruned = before - waiters.len();
                if pruned > 0 {
                    warn!(
                        target: "keyed::future_store",
                        key = ?key,
                        pruned,
                        "Pruned abandoned waiters on registration"
                    );
                }
            }
        }
        let handle = WaitHandle::pending();
        waiters.push(handle.clone());
        trace!(target: "keyed::future_store", key = ?key, waiters = waiters.len(), "Registered waiter");
        handle
    }

    /// Current value of `key` without registering a waiter
    pub fn try_get(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    /// True if `key` has been written
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of written keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Keys with at least one registered waiter
    pub fn pending_keys(&self) -> Vec<K> {
        self.pending.lock().keys().cloned().collect()
    }

    /// Number of waiters registered for `key`
    pub fn pending_count(&self, key: &K) -> usize {
        self.pending.lock().get(key).map_or(0, Vec::len)
    }

    /// Drop waiters whose handles no caller holds any more
    ///
    /// A waiter with a queued `on_resolved` callback is never dropped.
    ///
    /// Keys left with no waiters are removed from the pending table.
    /// Returns the number of waiters dropped.
    pub fn prune_abandoned(&self) -> usize {
        let mut pending = self.pending.lock();
        let mut pruned = 0;
        pending.retain(|_, waiters| {
            let before = waiters.len();
            waiters.retain(|w| !w.is_abandoned());
            pruned += before - waiters.len();
            !waiters.is_empty()
        });
        if pruned > 0 {
            warn!(target: "keyed::future_store", pruned, "Pruned abandoned waiters");
        }
        pruned
    }
}

impl<K, V> Default for KeyedFutureStore<K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Debug, V> Debug for KeyedFutureStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedFutureStore")
            .field("entries", &self.entries.read().len())
            .field("pending", &self.pending.lock().len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_put_then_get_is_immediate() {
        let store = KeyedFutureStore::new();
        store.put("Hello".to_string(), 5).unwrap();
        let handle = store.get(&"Hello".to_string());
        assert!(handle.is_resolved());
        assert_eq!(handle.wait(), 5);
        assert_eq!(store.pending_count(&"Hello".to_string()), 0);
    }

    #[test]
    fn test_get_before_put_is_pending() {
        let store: KeyedFutureStore<&str, u32> = KeyedFutureStore::new();
        let handle = store.get(&"World");
        assert!(!handle.is_resolved());
        assert_eq!(store.pending_count(&"World"), 1);
        assert_eq!(store.pending_keys(), vec!["World"]);

        store.put("World", 7).unwrap();
        assert_eq!(handle.try_value(), Some(7));
        assert!(store.pending_keys().is_empty());
    }

    #[test]
    fn test_second_put_fails_and_keeps_first_value() {
        let store = KeyedFutureStore::new();
        store.put(1u8, "first").unwrap();
        let err = store.put(1u8, "second").unwrap_err();
        assert!(err.is_already_present());
        assert_eq!(store.try_get(&1), Some("first"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_every_waiter_gets_the_value() {
        let store: KeyedFutureStore<u32, String> = KeyedFutureStore::new();
        let handles: Vec<_> = (0..5).map(|_| store.get(&1)).collect();
        assert_eq!(store.pending_count(&1), 5);
        store.put(1, "v".to_string()).unwrap();
        for handle in handles {
            assert_eq!(handle.try_value().as_deref(), Some("v"));
        }
    }

    #[test]
    fn test_waiters_on_other_keys_untouched() {
        let store: KeyedFutureStore<u32, u32> = KeyedFutureStore::new();
        let a = store.get(&1);
        let b = store.get(&2);
        store.put(1, 10).unwrap();
        assert!(a.is_resolved());
        assert!(!b.is_resolved());
        assert_eq!(store.pending_count(&2), 1);
    }

    #[test]
    fn test_from_entries() {
        let store = KeyedFutureStore::from_entries(vec![("a", 1), ("b", 2)]).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&"b").wait(), 2);

        let err = KeyedFutureStore::from_entries(vec![("a", 1), ("a", 2)]).unwrap_err();
        assert!(err.is_already_present());
    }

    #[test]
    fn test_empty_store() {
        let store: KeyedFutureStore<u8, u8> = KeyedFutureStore::default();
        assert!(store.is_empty());
        assert!(!store.contains_key(&0));
        assert_eq!(store.try_get(&0), None);
    }

    #[test]
    fn test_prune_abandoned_drops_only_dropped_handles() {
        let store: KeyedFutureStore<u8, u8> = KeyedFutureStore::new();
        let kept = store.get(&1);
        drop(store.get(&1));
        drop(store.get(&2));
        assert_eq!(store.prune_abandoned(), 2);
        assert_eq!(store.pending_count(&1), 1);
        assert_eq!(store.pending_keys(), vec![1]);

        store.put(1, 9).unwrap();
        assert_eq!(kept.try_value(), Some(9));
    }

    #[test]
    fn test_prune_on_registration_threshold() {
        let store: KeyedFutureStore<u8, u8> =
            KeyedFutureStore::with_config(StoreConfig::new().with_prune_abandoned_threshold(3));
        for _ in 0..3 {
            drop(store.get(&1));
        }
        assert_eq!(store.pending_count(&1), 3);
        // Fourth registration sees a full list and prunes it first
        let live = store.get(&1);
        assert_eq!(store.pending_count(&1), 1);
        store.put(1, 4).unwrap();
        assert_eq!(live.try_value(), Some(4));
    }

    #[test]
    fn test_prune_keeps_waiter_with_queued_callback() {
        let store: KeyedFutureStore<u8, u8> = KeyedFutureStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        store.get(&1).on_resolved(move |v| {
            assert_eq!(*v, 5);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(store.prune_abandoned(), 0);
        assert_eq!(store.pending_count(&1), 1);
        store.put(1, 5).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registration_threshold_keeps_queued_callback() {
        let store: KeyedFutureStore<u8, u8> =
            KeyedFutureStore::with_config(StoreConfig::new().with_prune_abandoned_threshold(1));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        store.get(&1).on_resolved(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        drop(store.get(&1));
        assert_eq!(store.pending_count(&1), 2);

        store.put(1, 5).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_can_reenter_store() {
        let store: Arc<KeyedFutureStore<u32, u32>> = Arc::new(KeyedFutureStore::new());
        let handle = store.get(&1);
        let chained = Arc::clone(&store);
        handle.on_resolved(move |v| {
            chained.put(2, v + 1).unwrap();
        });
        store.put(1, 1).unwrap();
        assert_eq!(store.try_get(&2), Some(2));
    }

    #[test]
    fn test_reader_thread_blocks_until_writer() {
        let store: Arc<KeyedFutureStore<String, u64>> = Arc::new(KeyedFutureStore::new());
        let reader = {
            let store = Arc::clone(&store);
            thread::spawn(move || store.get(&"k".to_string()).wait())
        };
        thread::sleep(Duration::from_millis(20));
        store.put("k".to_string(), 99).unwrap();
        assert_eq!(reader.join().unwrap(), 99);
    }
}
