//! Core types for the keyed stores
//!
//! This crate defines the foundational types shared by every store:
//! - Error: Error type and `Result` alias
//! - CancelSignal: Cooperative cancellation flag
//! - KeyLookup: Composite key requests grouped by outer key
//! - StoreConfig: Store configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod config;
pub mod error;
pub mod lookup;

pub use cancel::CancelSignal;
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use lookup::KeyLookup;
