//! Unsynchronized two-level map
//!
//! `GroupedMap` holds the table logic of the grouped store with no locking
//! of its own: every mutating method takes `&mut self`. The locked store
//! wraps it and decides which lock each call needs.
//!
//! Cancellation is polled between inner keys and never undoes work that
//! already landed.

use super::BulkOutcome;
use keyed_core::{CancelSignal, Error, KeyLookup, Result};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Outer key → inner key → value table
#[derive(Debug, Clone)]
pub struct GroupedMap<K1, K2, V> {
    groups: HashMap<K1, HashMap<K2, V>>,
}

impl<K1, K2, V> Default for GroupedMap<K1, K2, V> {
    fn default() -> Self {
        GroupedMap {
            groups: HashMap::new(),
        }
    }
}

impl<K1, K2, V> GroupedMap<K1, K2, V>
where
    K1: Hash + Eq + Clone + Debug,
    K2: Hash + Eq + Clone,
    V: Clone,
{
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update every requested pair
    ///
    /// Each inner key gets `add(outer, inner)` when absent or
    /// `update(outer, inner, &previous)` when present. An outer key's inner
    /// map is created by the first pair actually stored under it.
    ///
    /// `cancel` is checked before each factory call and again before the
    /// factory's result is stored, so a factory can veto its own result by
    /// cancelling. Pairs stored before cancellation stay stored.
    pub fn add_or_update_many<A, U>(
        &mut self,
        keys: &KeyLookup<K1, K2>,
        mut add: A,
        mut update: U,
        cancel: &CancelSignal,
    ) -> BulkOutcome
    where
        A: FnMut(&K1, &K2) -> V,
        U: FnMut(&K1, &K2, &V) -> V,
    {
        let mut outcome = BulkOutcome::default();
        for (outer, inners) in keys.groups() {
            for inner in inners {
                if cancel.is_cancelled() {
                    outcome.cancelled = true;
                    return outcome;
                }

                let (value, existed) = match self.get(outer, inner) {
                    Some(previous) => (update(outer, inner, previous), true),
                    None => (add(outer, inner), false),
                };

                if cancel.is_cancelled() {
                    outcome.cancelled = true;
                    return outcome;
                }

                self.groups
                    .entry(outer.clone())
                    .or_default()
                    .insert(inner.clone(), value);
                if existed {
                    outcome.updated += 1;
                } else {
                    outcome.added += 1;
                }
            }
        }
        outcome
    }

    /// Store every `(outer, inner, value)` triple, last one winning
    pub fn insert_items<I>(&mut self, items: I, cancel: &CancelSignal) -> BulkOutcome
    where
        I: IntoIterator<Item = (K1, K2, V)>,
    {
        let mut outcome = BulkOutcome::default();
        for (outer, inner, value) in items {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            match self.groups.entry(outer).or_default().insert(inner, value) {
                Some(_) => outcome.updated += 1,
                None => outcome.added += 1,
            }
        }
        outcome
    }

    /// Inner map for `outer`
    ///
    /// # Errors
    ///
    /// `NotFound` if no pair was ever stored under `outer`.
    pub fn grouping(&self, outer: &K1) -> Result<&HashMap<K2, V>> {
        self.groups.get(outer).ok_or_else(|| Error::not_found(outer))
    }

    /// Value stored for `(outer, inner)`
    pub fn get(&self, outer: &K1, inner: &K2) -> Option<&V> {
        self.groups.get(outer).and_then(|group| group.get(inner))
    }

    /// Every stored triple, in no particular order
    pub fn items(&self) -> impl Iterator<Item = (&K1, &K2, &V)> {
        self.groups.iter().flat_map(|(outer, group)| {
            group
                .iter()
                .map(move |(inner, value)| (outer, inner, value))
        })
    }

    /// Every stored key pair, grouped by outer key
    pub fn key_lookup(&self) -> KeyLookup<K1, K2> {
        self.items()
            .map(|(outer, inner, _)| (outer.clone(), inner.clone()))
            .collect()
    }

    /// Remove `(outer, inner)` if `predicate` accepts its current value
    ///
    /// The predicate sees `None` for a missing pair. Returns `None` when the
    /// predicate rejects the pair, otherwise `Some(previous)`, which is
    /// itself `None` if nothing was stored. Empty inner maps are kept.
    pub fn remove_if<P>(&mut self, outer: &K1, inner: &K2, predicate: P) -> Option<Option<V>>
    where
        P: FnOnce(&K1, &K2, Option<&V>) -> bool,
    {
        if !predicate(outer, inner, self.get(outer, inner)) {
            return None;
        }
        Some(
            self.groups
                .get_mut(outer)
                .and_then(|group| group.remove(inner)),
        )
    }

    /// Empty the whole table unless `cancel` already fired
    ///
    /// Returns `true` if the table was cleared.
    pub fn clear(&mut self, cancel: &CancelSignal) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        self.groups.clear();
        true
    }

    /// Number of stored pairs
    pub fn len(&self) -> usize {
        self.groups.values().map(HashMap::len).sum()
    }

    /// True if no pair is stored
    pub fn is_empty(&self) -> bool {
        self.groups.values().all(HashMap::is_empty)
    }

    /// Number of outer keys with an inner map, empty or not
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}
