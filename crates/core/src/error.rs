//! Error types for keyed stores
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Keys are rendered with `Debug` when an error is built, so `Error` stays
//! non-generic and can cross crate boundaries freely.

use std::fmt::Debug;
use thiserror::Error;

/// Result type alias for keyed store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the keyed stores
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Requested group or key was never created
    #[error("Key not found: {key}")]
    NotFound {
        /// Debug rendering of the missing key
        key: String,
    },

    /// Write-once key already holds a value
    #[error("Key already present: {key}")]
    AlreadyPresent {
        /// Debug rendering of the occupied key
        key: String,
    },

    /// Operation was cancelled before it could acquire the store lock
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration document could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(String),
}

impl Error {
    /// Build a `NotFound` error for any debuggable key
    pub fn not_found<K: Debug + ?Sized>(key: &K) -> Self {
        Error::NotFound {
            key: format!("{:?}", key),
        }
    }

    /// Build an `AlreadyPresent` error for any debuggable key
    pub fn already_present<K: Debug + ?Sized>(key: &K) -> Self {
        Error::AlreadyPresent {
            key: format!("{:?}", key),
        }
    }

    /// True if this error is `NotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True if this error is `AlreadyPresent`
    pub fn is_already_present(&self) -> bool {
        matches!(self, Error::AlreadyPresent { .. })
    }

    /// True if this error is `Cancelled`
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::ConfigParse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::not_found(&("group", 7));
        let msg = err.to_string();
        assert!(msg.contains("Key not found"));
        assert!(msg.contains("\"group\""));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_display_already_present() {
        let err = Error::already_present("Hello");
        let msg = err.to_string();
        assert!(msg.contains("Key already present"));
        assert!(msg.contains("Hello"));
        assert!(err.is_already_present());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_error_display_cancelled() {
        let err = Error::Cancelled;
        assert_eq!(err.to_string(), "Operation cancelled");
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_error_display_invalid_config() {
        let err = Error::InvalidConfig("threshold must be positive".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Invalid configuration"));
        assert!(msg.contains("threshold must be positive"));
    }

    #[test]
    fn test_error_from_toml() {
        let parse: std::result::Result<toml::Value, _> = toml::from_str("initial_capacity = ");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::ConfigParse(_)));
    }
}
