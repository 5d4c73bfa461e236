//! Composite key requests grouped by outer key
//!
//! `KeyLookup` is the request shape of the grouped store's bulk operations:
//! a list of outer keys, each with the inner keys asked for under it. Groups
//! keep first-seen order so results stream back in the order they were asked.

use std::collections::HashMap;
use std::hash::Hash;

/// Ordered grouping of `(outer, inner)` key pairs by outer key
///
/// # Example
///
/// ```
/// use keyed_core::KeyLookup;
///
/// let lookup: KeyLookup<&str, u32> = [("a", 1), ("b", 1), ("a", 2)].into_iter().collect();
/// let groups: Vec<_> = lookup.groups().collect();
/// assert_eq!(groups, vec![(&"a", &[1, 2][..]), (&"b", &[1][..])]);
/// assert_eq!(lookup.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct KeyLookup<K1, K2> {
    groups: Vec<(K1, Vec<K2>)>,
    index: HashMap<K1, usize>,
    pairs: usize,
}

impl<K1, K2> Default for KeyLookup<K1, K2> {
    fn default() -> Self {
        KeyLookup {
            groups: Vec::new(),
            index: HashMap::new(),
            pairs: 0,
        }
    }
}

impl<K1: Hash + Eq + Clone, K2> KeyLookup<K1, K2> {
    /// Create an empty lookup
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup holding exactly one pair
    pub fn single(outer: K1, inner: K2) -> Self {
        let mut lookup = Self::new();
        lookup.push(outer, inner);
        lookup
    }

    /// Append `inner` to the group for `outer`, creating the group if needed
    pub fn push(&mut self, outer: K1, inner: K2) {
        match self.index.get(&outer) {
            Some(&slot) => self.groups[slot].1.push(inner),
            None => {
                self.index.insert(outer.clone(), self.groups.len());
                self.groups.push((outer, vec![inner]));
            }
        }
        self.pairs += 1;
    }

    /// Inner keys requested under `outer`, if any
    pub fn get(&self, outer: &K1) -> Option<&[K2]> {
        self.index
            .get(outer)
            .map(|&slot| self.groups[slot].1.as_slice())
    }
}

impl<K1, K2> KeyLookup<K1, K2> {
    /// Groups in first-seen order
    pub fn groups(&self) -> impl Iterator<Item = (&K1, &[K2])> {
        self.groups.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Every `(outer, inner)` pair, group by group
    pub fn pairs(&self) -> impl Iterator<Item = (&K1, &K2)> {
        self.groups
            .iter()
            .flat_map(|(outer, inners)| inners.iter().map(move |inner| (outer, inner)))
    }

    /// Total number of pairs
    pub fn len(&self) -> usize {
        self.pairs
    }

    /// True if no pair was requested
    pub fn is_empty(&self) -> bool {
        self.pairs == 0
    }

    /// Number of distinct outer keys
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

impl<K1: Hash + Eq + Clone, K2> FromIterator<(K1, K2)> for KeyLookup<K1, K2> {
    fn from_iter<I: IntoIterator<Item = (K1, K2)>>(iter: I) -> Self {
        let mut lookup = Self::new();
        lookup.extend(iter);
        lookup
    }
}

impl<K1: Hash + Eq + Clone, K2> Extend<(K1, K2)> for KeyLookup<K1, K2> {
    fn extend<I: IntoIterator<Item = (K1, K2)>>(&mut self, iter: I) {
        for (outer, inner) in iter {
            self.push(outer, inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_lookup() {
        let lookup: KeyLookup<String, u32> = KeyLookup::new();
        assert!(lookup.is_empty());
        assert_eq!(lookup.len(), 0);
        assert_eq!(lookup.group_count(), 0);
        assert_eq!(lookup.pairs().count(), 0);
    }

    #[test]
    fn test_grouping_keeps_first_seen_order() {
        let lookup: KeyLookup<&str, u32> =
            vec![("b", 1), ("a", 1), ("b", 2), ("a", 3)].into_iter().collect();
        let outer: Vec<_> = lookup.groups().map(|(k, _)| *k).collect();
        assert_eq!(outer, vec!["b", "a"]);
        assert_eq!(lookup.get(&"b"), Some(&[1, 2][..]));
        assert_eq!(lookup.get(&"a"), Some(&[1, 3][..]));
        assert_eq!(lookup.get(&"c"), None);
        assert_eq!(lookup.group_count(), 2);
    }

    #[test]
    fn test_pairs_flatten_groups() {
        let lookup: KeyLookup<&str, u32> =
            vec![("x", 1), ("y", 9), ("x", 2)].into_iter().collect();
        let pairs: Vec<_> = lookup.pairs().map(|(a, b)| (*a, *b)).collect();
        assert_eq!(pairs, vec![("x", 1), ("x", 2), ("y", 9)]);
    }

    #[test]
    fn test_duplicate_pairs_are_kept() {
        let mut lookup = KeyLookup::single("x", 1);
        lookup.push("x", 1);
        assert_eq!(lookup.len(), 2);
        assert_eq!(lookup.group_count(), 1);
    }

    proptest::proptest! {
        #[test]
        fn prop_pairs_preserve_every_input(input in proptest::collection::vec((0u8..5, 0u16..100), 0..50)) {
            let lookup: KeyLookup<u8, u16> = input.iter().copied().collect();
            proptest::prop_assert_eq!(lookup.len(), input.len());

            let mut flattened: Vec<(u8, u16)> = lookup.pairs().map(|(a, b)| (*a, *b)).collect();
            let mut expected = input.clone();
            flattened.sort();
            expected.sort();
            proptest::prop_assert_eq!(flattened, expected);

            // Within a group, inner keys keep input order
            for (outer, inners) in lookup.groups() {
                let in_order: Vec<u16> = input.iter().filter(|(o, _)| o == outer).map(|(_, i)| *i).collect();
                proptest::prop_assert_eq!(inners, in_order.as_slice());
            }
        }
    }
}
