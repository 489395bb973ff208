//! Cache trait shared by every watcher.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Name of the index every cache must provide.
pub const PRIMARY_INDEX: &str = "primary";

/// Derives an entry's key under one index.
///
/// `Ok(None)` means no key can be generated for the entry. Callers that need
/// a key treat that as a failure.
pub type KeyDeriver<E> = Arc<dyn Fn(&E) -> Result<Option<String>> + Send + Sync>;

/// Callback invoked for each entry visited by [`Cache::get`].
pub type Visitor<'a, E> = dyn FnMut(&E) -> Result<Visit> + Send + 'a;

/// Callback invoked by [`Cache::compare_and_update`] with the current entry.
///
/// Returning `Some` stores the replacement, `None` leaves the entry untouched.
pub type MergeFn<'a, E> = dyn FnMut(&E) -> Result<Option<E>> + Send + 'a;

/// Whether a scan should go on after visiting an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Visit the next entry.
    Continue,
    /// End the scan.
    Stop,
}

/// Indexed, concurrently accessible entry store.
///
/// Each operation is individually atomic. Many watchers may share one cache.
#[async_trait]
pub trait Cache<E>: Send + Sync
where
    E: Send + Sync + 'static,
{
    /// Get the key deriver for an index.
    fn key_deriver(&self, index: &str) -> Result<KeyDeriver<E>>;

    /// Visit every entry whose key under `index` starts with `prefix`.
    ///
    /// An error returned by the visitor aborts the scan and is propagated.
    async fn get(&self, index: &str, prefix: &str, visitor: &mut Visitor<'_, E>) -> Result<()>;

    /// Add an entry.
    async fn add(&self, entry: E) -> Result<()>;

    /// Delete the entry stored under `entry`'s key. Returns whether one existed.
    async fn delete(&self, entry: &E) -> Result<bool>;

    /// Run `merge` against the entry stored under `existing`'s key and store
    /// its replacement, if any. Returns whether the entry was replaced.
    async fn compare_and_update(&self, merge: &mut MergeFn<'_, E>, existing: &E) -> Result<bool>;

    /// Number of stored entries.
    async fn len(&self) -> Result<usize>;

    /// Whether the cache holds no entries.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
