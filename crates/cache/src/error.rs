//! Error types for the cache crate.

use thiserror::Error;

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Cache error types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// No index registered under this name.
    #[error("unknown index '{index}'")]
    UnknownIndex { index: String },

    /// An index key could not be derived for an entry.
    #[error("failed to derive key under index '{index}': {reason}")]
    KeyDerivation { index: String, reason: String },

    /// No entry is stored under the key.
    #[error("no entry stored under key '{key}'")]
    NotFound { key: String },

    /// A visitor aborted a scan.
    #[error("scan aborted by visitor: {reason}")]
    Visitor { reason: String },
}

impl CacheError {
    /// Create an unknown index error.
    pub fn unknown_index(index: impl Into<String>) -> Self {
        Self::UnknownIndex {
            index: index.into(),
        }
    }

    /// Create a key derivation error.
    pub fn key_derivation(index: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::KeyDerivation {
            index: index.into(),
            reason: reason.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a visitor error.
    pub fn visitor(reason: impl Into<String>) -> Self {
        Self::Visitor {
            reason: reason.into(),
        }
    }
}
