//! Two-level grouped store
//!
//! - `GroupedMap`: the table logic, unsynchronized
//! - `GroupedKeyedStore`: the same table behind one async reader/writer lock
//! - `ItemStream`, `LookupStream`, `RemoveStream`: lazy results that hold the
//!   lock until dropped

mod convenience;
mod map;
mod store;

pub use map::GroupedMap;
pub use store::{GroupedKeyedStore, ItemStream, LookupStream, RemoveStream};

/// Summary of a bulk add-or-update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Pairs that were absent and got a value
    pub added: usize,
    /// Pairs that were present and got replaced
    pub updated: usize,
    /// The call stopped early because its signal fired
    pub cancelled: bool,
}

impl BulkOutcome {
    /// Pairs written by the call
    pub fn applied(&self) -> usize {
        self.added + self.updated
    }
}
