//! Lock-guarded grouped store
//!
//! `GroupedKeyedStore` serializes every operation through one
//! `tokio::sync::RwLock` around a [`GroupedMap`]:
//!
//! | Operation            | Lock      | Held until            |
//! |----------------------|-----------|-----------------------|
//! | `add_or_update_many` | exclusive | call returns          |
//! | `get_grouping`       | shared    | snapshot is copied    |
//! | `stream_items*`      | shared    | stream is dropped     |
//! | `stream_remove*`     | exclusive | stream is dropped     |
//! | `clear`              | exclusive | call returns          |
//!
//! Acquisition parks the task, not the thread, and races the caller's
//! [`CancelSignal`]: a signal that fires while waiting yields
//! `Err(Cancelled)` with nothing touched. Once the lock is held,
//! cancellation only ends work early; it never rolls anything back.
//!
//! Streams own their guard, so a writer queued behind a stream waits for the
//! whole enumeration and never sees it half done. Drop streams promptly.

use super::{BulkOutcome, GroupedMap};
use keyed_core::{CancelSignal, Error, KeyLookup, Result};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::vec;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::debug;

type RemovePredicate<K1, K2, V> = Box<dyn FnMut(&K1, &K2, Option<&V>) -> bool + Send>;

/// Two-level keyed store behind a single async reader/writer lock
pub struct GroupedKeyedStore<K1, K2, V> {
    table: Arc<RwLock<GroupedMap<K1, K2, V>>>,
}

impl<K1, K2, V> Clone for GroupedKeyedStore<K1, K2, V> {
    /// Clones share the same table and lock
    fn clone(&self) -> Self {
        GroupedKeyedStore {
            table: Arc::clone(&self.table),
        }
    }
}

impl<K1, K2, V> GroupedKeyedStore<K1, K2, V>
where
    K1: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    K2: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty store
    pub fn new() -> Self {
        Self::from_map(GroupedMap::new())
    }

    /// Put an existing table behind the lock
    pub fn from_map(map: GroupedMap<K1, K2, V>) -> Self {
        GroupedKeyedStore {
            table: Arc::new(RwLock::new(map)),
        }
    }

    pub(super) async fn read_table(
        &self,
        cancel: &CancelSignal,
    ) -> Result<OwnedRwLockReadGuard<GroupedMap<K1, K2, V>>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            guard = Arc::clone(&self.table).read_owned() => Ok(guard),
        }
    }

    pub(super) async fn write_table(
        &self,
        cancel: &CancelSignal,
    ) -> Result<OwnedRwLockWriteGuard<GroupedMap<K1, K2, V>>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            guard = Arc::clone(&self.table).write_owned() => Ok(guard),
        }
    }

    /// Add or update every pair in `keys` under the exclusive lock
    ///
    /// See [`GroupedMap::add_or_update_many`] for factory and cancellation
    /// semantics. Factories run while the lock is held and must not call
    /// back into this store.
    ///
    /// # Errors
    ///
    /// `Cancelled` if `cancel` fired before the lock was acquired.
    pub async fn add_or_update_many<A, U>(
        &self,
        keys: &KeyLookup<K1, K2>,
        add: A,
        update: U,
        cancel: &CancelSignal,
    ) -> Result<BulkOutcome>
    where
        A: FnMut(&K1, &K2) -> V,
        U: FnMut(&K1, &K2, &V) -> V,
    {
        let mut table = self.write_table(cancel).await?;
        let outcome = table.add_or_update_many(keys, add, update, cancel);
        debug!(
            target: "keyed::grouped",
            requested = keys.len(),
            added = outcome.added,
            updated = outcome.updated,
            cancelled = outcome.cancelled,
            "Bulk add-or-update"
        );
        Ok(outcome)
    }

    /// Copy of the inner map for `outer`
    ///
    /// The copy is taken under the shared lock and shares nothing with the
    /// table.
    ///
    /// # Errors
    ///
    /// `NotFound` if `outer` has no group, `Cancelled` if `cancel` fired
    /// before the lock was acquired.
    pub async fn get_grouping(&self, outer: &K1, cancel: &CancelSignal) -> Result<HashMap<K2, V>> {
        let table = self.read_table(cancel).await?;
        table.grouping(outer).cloned()
    }

    /// Stream every stored triple under the shared lock
    ///
    /// # Errors
    ///
    /// `Cancelled` if `cancel` fired before the lock was acquired.
    pub async fn stream_items(&self, cancel: &CancelSignal) -> Result<ItemStream<K1, K2, V>> {
        let table = self.read_table(cancel).await?;
        let plan: Vec<(K1, K2)> = table
            .items()
            .map(|(outer, inner, _)| (outer.clone(), inner.clone()))
            .collect();
        debug!(target: "keyed::grouped", items = plan.len(), "Streaming all items");
        Ok(ItemStream {
            cursor: ReadCursor::new(table, plan, cancel),
        })
    }

    /// Stream the requested pairs under the shared lock
    ///
    /// Every requested pair is yielded, with `None` for pairs that are not
    /// stored.
    ///
    /// # Errors
    ///
    /// `Cancelled` if `cancel` fired before the lock was acquired.
    pub async fn stream_items_for(
        &self,
        keys: &KeyLookup<K1, K2>,
        cancel: &CancelSignal,
    ) -> Result<LookupStream<K1, K2, V>> {
        let table = self.read_table(cancel).await?;
        let plan: Vec<(K1, K2)> = keys
            .pairs()
            .map(|(outer, inner)| (outer.clone(), inner.clone()))
            .collect();
        debug!(target: "keyed::grouped", requested = plan.len(), "Streaming requested items");
        Ok(LookupStream {
            cursor: ReadCursor::new(table, plan, cancel),
        })
    }

    /// Stream removals under the exclusive lock
    ///
    /// `keys` defaults to every pair stored when the lock is acquired. Each
    /// candidate is offered to `predicate` with its current value (`None` if
    /// absent); accepted candidates are removed as the stream reaches them
    /// and yielded with their previous value. Rejected candidates are
    /// skipped. Removal is lazy: pairs the stream never reaches stay put.
    ///
    /// # Errors
    ///
    /// `Cancelled` if `cancel` fired before the lock was acquired.
    pub async fn stream_remove<P>(
        &self,
        keys: Option<KeyLookup<K1, K2>>,
        predicate: P,
        cancel: &CancelSignal,
    ) -> Result<RemoveStream<K1, K2, V>>
    where
        P: FnMut(&K1, &K2, Option<&V>) -> bool + Send + 'static,
    {
        let table = self.write_table(cancel).await?;
        let keys = keys.unwrap_or_else(|| table.key_lookup());
        let plan: Vec<(K1, K2)> = keys
            .pairs()
            .map(|(outer, inner)| (outer.clone(), inner.clone()))
            .collect();
        debug!(target: "keyed::grouped", candidates = plan.len(), "Streaming removals");
        Ok(RemoveStream {
            table,
            plan: plan.into_iter(),
            predicate: Box::new(predicate),
            cancel: cancel.clone(),
            cancelled: false,
            removed: 0,
        })
    }

    /// [`stream_remove`](Self::stream_remove) accepting every candidate
    pub async fn stream_remove_all(
        &self,
        keys: Option<KeyLookup<K1, K2>>,
        cancel: &CancelSignal,
    ) -> Result<RemoveStream<K1, K2, V>> {
        self.stream_remove(keys, |_, _, _| true, cancel).await
    }

    /// Empty the whole table under the exclusive lock
    ///
    /// Returns `Ok(false)` without touching the table if `cancel` fired
    /// after the lock was acquired.
    ///
    /// # Errors
    ///
    /// `Cancelled` if `cancel` fired before the lock was acquired.
    pub async fn clear(&self, cancel: &CancelSignal) -> Result<bool> {
        let mut table = self.write_table(cancel).await?;
        let cleared = table.clear(cancel);
        debug!(target: "keyed::grouped", cleared, "Clear");
        Ok(cleared)
    }

    /// Number of stored pairs
    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }

    /// True if no pair is stored
    pub async fn is_empty(&self) -> bool {
        self.table.read().await.is_empty()
    }

    /// Number of outer keys with an inner map
    pub async fn group_count(&self) -> usize {
        self.table.read().await.group_count()
    }
}

impl<K1, K2, V> Default for GroupedKeyedStore<K1, K2, V>
where
    K1: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    K2: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

struct ReadCursor<K1, K2, V> {
    table: OwnedRwLockReadGuard<GroupedMap<K1, K2, V>>,
    plan: vec::IntoIter<(K1, K2)>,
    cancel: CancelSignal,
    cancelled: bool,
}

impl<K1, K2, V> ReadCursor<K1, K2, V>
where
    K1: Hash + Eq + Clone + Debug,
    K2: Hash + Eq + Clone,
    V: Clone,
{
    fn new(
        table: OwnedRwLockReadGuard<GroupedMap<K1, K2, V>>,
        plan: Vec<(K1, K2)>,
        cancel: &CancelSignal,
    ) -> Self {
        ReadCursor {
            table,
            plan: plan.into_iter(),
            cancel: cancel.clone(),
            cancelled: false,
        }
    }

    fn next_entry(&mut self) -> Option<(K1, K2, Option<V>)> {
        if self.cancelled {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.cancelled = true;
            debug!(target: "keyed::grouped", remaining = self.plan.len(), "Read stream cancelled");
            return None;
        }
        let (outer, inner) = self.plan.next()?;
        let value = self.table.get(&outer, &inner).cloned();
        Some((outer, inner, value))
    }
}

/// Every stored `(outer, inner, value)`, holding the shared lock
pub struct ItemStream<K1, K2, V> {
    cursor: ReadCursor<K1, K2, V>,
}

impl<K1, K2, V> ItemStream<K1, K2, V> {
    /// True if the stream ended because its signal fired
    pub fn was_cancelled(&self) -> bool {
        self.cursor.cancelled
    }
}

impl<K1, K2, V> Iterator for ItemStream<K1, K2, V>
where
    K1: Hash + Eq + Clone + Debug,
    K2: Hash + Eq + Clone,
    V: Clone,
{
    type Item = (K1, K2, V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let (outer, inner, Some(value)) = self.cursor.next_entry()? {
                return Some((outer, inner, value));
            }
        }
    }
}

/// Requested `(outer, inner, Option<value>)`, holding the shared lock
pub struct LookupStream<K1, K2, V> {
    cursor: ReadCursor<K1, K2, V>,
}

impl<K1, K2, V> LookupStream<K1, K2, V> {
    /// True if the stream ended because its signal fired
    pub fn was_cancelled(&self) -> bool {
        self.cursor.cancelled
    }
}

impl<K1, K2, V> Iterator for LookupStream<K1, K2, V>
where
    K1: Hash + Eq + Clone + Debug,
    K2: Hash + Eq + Clone,
    V: Clone,
{
    type Item = (K1, K2, Option<V>);

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next_entry()
    }
}

/// Removed `(outer, inner, Option<previous>)`, holding the exclusive lock
pub struct RemoveStream<K1, K2, V> {
    table: OwnedRwLockWriteGuard<GroupedMap<K1, K2, V>>,
    plan: vec::IntoIter<(K1, K2)>,
    predicate: RemovePredicate<K1, K2, V>,
    cancel: CancelSignal,
    cancelled: bool,
    removed: usize,
}

impl<K1, K2, V> RemoveStream<K1, K2, V> {
    /// True if the stream ended because its signal fired
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Number of stored pairs removed so far
    pub fn removed(&self) -> usize {
        self.removed
    }
}

impl<K1, K2, V> Iterator for RemoveStream<K1, K2, V>
where
    K1: Hash + Eq + Clone + Debug,
    K2: Hash + Eq + Clone,
    V: Clone,
{
    type Item = (K1, K2, Option<V>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cancelled {
                return None;
            }
            if self.cancel.is_cancelled() {
                self.cancelled = true;
                debug!(target: "keyed::grouped", remaining = self.plan.len(), "Remove stream cancelled");
                return None;
            }
            let (outer, inner) = self.plan.next()?;
            let predicate = &mut self.predicate;
            if let Some(previous) =
                self.table
                    .remove_if(&outer, &inner, |o, i, v| predicate(o, i, v))
            {
                if previous.is_some() {
                    self.removed += 1;
                }
                return Some((outer, inner, previous));
            }
        }
    }
}

impl<K1, K2, V> Drop for RemoveStream<K1, K2, V> {
    fn drop(&mut self) {
        debug!(
            target: "keyed::grouped",
            removed = self.removed,
            skipped = self.plan.len(),
            "Remove stream released lock"
        );
    }
}
