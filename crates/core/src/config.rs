//! Store configuration
//!
//! `StoreConfig` can be built in code with the `with_*` setters or parsed from
//! a TOML document. Every field has a default, so an empty document is valid.
//!
//! # Example
//!
//! ```toml
//! # Pre-size the entry table (default: 0)
//! initial_capacity = 1024
//!
//! # Prune dropped waiters once a key has this many pending (default: off)
//! prune_abandoned_threshold = 64
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration shared by the keyed stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Number of entries to reserve up front
    #[serde(default)]
    pub initial_capacity: usize,

    /// Waiter-list length that triggers pruning of abandoned waiters
    ///
    /// `None` disables pruning on registration. Pruning can still be run
    /// explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prune_abandoned_threshold: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            prune_abandoned_threshold: None,
        }
    }
}

impl StoreConfig {
    /// Create a StoreConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial entry capacity
    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    /// Enable pruning of abandoned waiters at the given list length
    pub fn with_prune_abandoned_threshold(mut self, threshold: usize) -> Self {
        self.prune_abandoned_threshold = Some(threshold);
        self
    }

    /// Check field ranges
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the pruning threshold is zero.
    pub fn validate(&self) -> Result<()> {
        if self.prune_abandoned_threshold == Some(0) {
            return Err(Error::InvalidConfig(
                "prune_abandoned_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}
