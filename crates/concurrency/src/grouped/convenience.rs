//! Single-pair helpers layered on the bulk operations
//!
//! None of these take the lock themselves; each is one bulk call. Prefer the
//! bulk operations when touching more than one pair.

use super::{BulkOutcome, GroupedKeyedStore};
use keyed_core::{CancelSignal, KeyLookup, Result};
use std::fmt::Debug;
use std::hash::Hash;

impl<K1, K2, V> GroupedKeyedStore<K1, K2, V>
where
    K1: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    K2: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Store `(outer, inner, value)` triples, replacing existing values
    ///
    /// A pair repeated in `items` ends up with its last value.
    pub async fn add_or_update_items<I>(&self, items: I, cancel: &CancelSignal) -> Result<BulkOutcome>
    where
        I: IntoIterator<Item = (K1, K2, V)>,
    {
        // Materialize before locking so caller iterators never run under the lock.
        let items: Vec<(K1, K2, V)> = items.into_iter().collect();
        let mut table = self.write_table(cancel).await?;
        let outcome = table.insert_items(items, cancel);
        tracing::debug!(
            target: "keyed::grouped",
            added = outcome.added,
            updated = outcome.updated,
            cancelled = outcome.cancelled,
            "Bulk item upsert"
        );
        Ok(outcome)
    }

    /// Store `value` only if `(outer, inner)` is absent
    ///
    /// Returns `false` if the pair already held a value, which is left as is,
    /// or if `cancel` fired once the lock was held. The update path rejects
    /// by cancelling a child of `cancel`.
    ///
    /// # Errors
    ///
    /// `Cancelled` if `cancel` fired before the lock was acquired.
    pub async fn try_add(&self, outer: K1, inner: K2, value: V, cancel: &CancelSignal) -> Result<bool> {
        let rejected = cancel.child();
        let veto = rejected.clone();
        let outcome = self
            .add_or_update_many(
                &KeyLookup::single(outer, inner),
                move |_, _| value.clone(),
                move |_, _, previous| {
                    veto.cancel();
                    previous.clone()
                },
                &rejected,
            )
            .await?;
        Ok(outcome.added == 1)
    }

    /// Replace the value of `(outer, inner)` only if it equals `expected`
    ///
    /// Returns `false` if the pair is absent or holds something else, or if
    /// `cancel` fired once the lock was held.
    ///
    /// # Errors
    ///
    /// `Cancelled` if `cancel` fired before the lock was acquired.
    pub async fn try_update(
        &self,
        outer: K1,
        inner: K2,
        expected: V,
        value: V,
        cancel: &CancelSignal,
    ) -> Result<bool>
    where
        V: PartialEq,
    {
        let rejected = cancel.child();
        let veto_add = rejected.clone();
        let veto_update = rejected.clone();
        let discarded = value.clone();
        let outcome = self
            .add_or_update_many(
                &KeyLookup::single(outer, inner),
                move |_, _| {
                    veto_add.cancel();
                    discarded.clone()
                },
                move |_, _, previous| {
                    if *previous != expected {
                        veto_update.cancel();
                        return previous.clone();
                    }
                    value.clone()
                },
                &rejected,
            )
            .await?;
        Ok(outcome.updated == 1)
    }

    /// Value stored for `(outer, inner)`, read as a one-pair lookup stream
    pub async fn try_get_single(
        &self,
        outer: K1,
        inner: K2,
        cancel: &CancelSignal,
    ) -> Result<Option<V>> {
        let mut stream = self
            .stream_items_for(&KeyLookup::single(outer, inner), cancel)
            .await?;
        Ok(stream.next().and_then(|(_, _, value)| value))
    }
}
