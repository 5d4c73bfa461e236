//! Keyedstore - concurrent keyed stores that resolve reads against future writes
//!
//! Two stores are provided:
//!
//! - [`KeyedFutureStore`]: a write-once map. Reading a key that has not been
//!   written yet returns a [`WaitHandle`] that resolves when it is.
//! - [`GroupedKeyedStore`]: a two-level map behind one async reader/writer
//!   lock, with cancellable bulk writes, lock-holding streams and snapshot
//!   reads.
//!
//! # Quick Start
//!
//! ```
//! use keyedstore::{CancelSignal, GroupedKeyedStore, KeyedFutureStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> keyedstore::Result<()> {
//! let store = KeyedFutureStore::new();
//! let pending = store.get(&"answer");
//! store.put("answer", 42)?;
//! assert_eq!(pending.await, 42);
//!
//! let grouped = GroupedKeyedStore::new();
//! let none = CancelSignal::new();
//! grouped
//!     .add_or_update_items(vec![("team", 1, "alice"), ("team", 2, "bob")], &none)
//!     .await?;
//! let team = grouped.get_grouping(&"team", &none).await?;
//! assert_eq!(team.len(), 2);
//! # Ok(())
//! # }
//! ```

pub use keyed_concurrency::*;
pub use keyed_core::{CancelSignal, Error, KeyLookup, Result, StoreConfig};
