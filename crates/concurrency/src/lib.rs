//! Concurrent keyed stores
//!
//! This crate implements stores whose reads can be resolved by later writes:
//! - KeyedFutureStore: write-once map; reads of absent keys wait for the write
//! - WaitHandle: one-shot handle delivered to each waiting reader
//! - GroupedKeyedStore: two-level map behind a single async reader/writer
//!   lock, with cancellable bulk writes and lock-holding streams
//! - GroupedMap: the unsynchronized table under GroupedKeyedStore

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod future_store;
pub mod grouped;
pub mod wait_handle;

pub use future_store::KeyedFutureStore;
pub use grouped::{
    BulkOutcome, GroupedKeyedStore, GroupedMap, ItemStream, LookupStream, RemoveStream,
};
pub use wait_handle::WaitHandle;
