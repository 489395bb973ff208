//! Tracing decorator for caches.

use async_trait::async_trait;

use crate::cache::{Cache, KeyDeriver, MergeFn, Visitor};
use crate::error::Result;

/// A wrapper that adds tracing to a cache.
pub struct TracingCache<C> {
    inner: C,
}

impl<C> TracingCache<C> {
    /// Create a new tracing cache.
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    /// Get the wrapped cache.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<E, C> Cache<E> for TracingCache<C>
where
    E: Send + Sync + 'static,
    C: Cache<E>,
{
    fn key_deriver(&self, index: &str) -> Result<KeyDeriver<E>> {
        self.inner.key_deriver(index)
    }

    async fn get(&self, index: &str, prefix: &str, visitor: &mut Visitor<'_, E>) -> Result<()> {
        tracing::trace!(index, prefix, "Scanning cache");
        let result = self.inner.get(index, prefix, visitor).await;
        if let Err(ref e) = result {
            tracing::debug!(index, prefix, error = %e, "Cache scan failed");
        }
        result
    }

    async fn add(&self, entry: E) -> Result<()> {
        let result = self.inner.add(entry).await;
        match result {
            Ok(()) => tracing::trace!("Cache entry added"),
            Err(ref e) => tracing::debug!(error = %e, "Cache add failed"),
        }
        result
    }

    async fn delete(&self, entry: &E) -> Result<bool> {
        let result = self.inner.delete(entry).await;
        match result {
            Ok(existed) => tracing::trace!(existed, "Cache entry deleted"),
            Err(ref e) => tracing::debug!(error = %e, "Cache delete failed"),
        }
        result
    }

    async fn compare_and_update(&self, merge: &mut MergeFn<'_, E>, existing: &E) -> Result<bool> {
        let result = self.inner.compare_and_update(merge, existing).await;
        match result {
            Ok(replaced) => tracing::trace!(replaced, "Cache entry compared"),
            Err(ref e) => tracing::debug!(error = %e, "Cache update failed"),
        }
        result
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }
}
