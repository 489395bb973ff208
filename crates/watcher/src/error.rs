//! Error types for the watcher crate.

use mirror_cache::CacheError;
use thiserror::Error;

use crate::types::ErrorStatus;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by a remote client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode payload: {0}")]
    Decode(String),

    #[error("remote returned status {code}: {message}")]
    Status { code: u16, message: String },
}

/// Watcher error types.
///
/// Everything except [`Error::InvalidConfig`], [`Error::AlreadyWatching`] and
/// [`Error::Stopped`] is a pass failure: the watcher logs it and restarts from
/// a fresh listing.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Fetching the full listing failed.
    #[error("listing {kind} failed: {source}")]
    List {
        kind: &'static str,
        source: ClientError,
    },

    /// Opening the change stream failed.
    #[error("opening {kind} change stream at version '{resource_version}' failed: {source}")]
    Watch {
        kind: &'static str,
        resource_version: String,
        source: ClientError,
    },

    /// The change stream delivered an error event.
    #[error("{kind} change stream ended in error: {status}")]
    StreamError {
        kind: &'static str,
        status: ErrorStatus,
    },

    /// The change stream delivered a payload that could not be decoded.
    #[error("malformed {kind} event: {source}")]
    MalformedEvent {
        kind: &'static str,
        source: ClientError,
    },

    /// No key could be derived for an object.
    #[error("failed to derive key for {kind} object: {reason}")]
    KeyDerivation { kind: &'static str, reason: String },

    /// Cache operation failed.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// `watch()` was called on a watcher that was already started.
    #[error("{kind} watcher already started")]
    AlreadyWatching { kind: &'static str },

    /// The watcher stopped before its first successful reconciliation.
    #[error("{kind} watcher stopped before becoming ready")]
    Stopped { kind: &'static str },
}

impl Error {
    /// Create a key derivation error.
    pub fn key_derivation(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::KeyDerivation {
            kind,
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether the watcher recovers from this error by relisting.
    pub const fn is_restartable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidConfig { .. } | Self::AlreadyWatching { .. } | Self::Stopped { .. }
        )
    }
}
