//! Reconciliation pass: diff a fresh remote listing against the cache.

use std::collections::HashMap;
use std::sync::Arc;

use mirror_cache::{Cache, CacheError, KeyDeriver, Visit, PRIMARY_INDEX};
use serde::Serialize;
use tracing::{debug, info};

use crate::client::RemoteClient;
use crate::error::{Error, Result};
use crate::strategy::{merge_into_cache, MergeStrategy};
use crate::types::{kind_prefix, normalize, Resource, Scope};

/// Counts produced by one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    /// Objects absent from the cache, now added.
    pub added: usize,
    /// Cached entries the merge strategy changed.
    pub updated: usize,
    /// Cached entries already matching the remote object.
    pub unchanged: usize,
    /// Cached entries without a remote counterpart, now removed.
    pub stale: usize,
}

impl ReconcileStats {
    /// Number of cache writes the pass performed.
    pub const fn changes(&self) -> usize {
        self.added + self.updated + self.stale
    }

    /// Whether the cache already matched the listing.
    pub const fn is_converged(&self) -> bool {
        self.changes() == 0
    }
}

/// Result of a successful pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// What the pass did.
    pub stats: ReconcileStats,
    /// Version of the listing; the next change stream opens here.
    pub resource_version: String,
}

/// One-shot list-and-diff of a resource kind against the cache.
pub struct Reconciler<R, E> {
    client: Arc<dyn RemoteClient<R>>,
    cache: Arc<dyn Cache<E>>,
    strategy: Arc<dyn MergeStrategy<R, E>>,
    scope: Scope,
}

impl<R, E> Reconciler<R, E>
where
    R: Resource,
    E: Clone + Send + Sync + 'static,
{
    /// Create a reconciler for `scope`.
    ///
    /// Cache keys are always derived under [`PRIMARY_INDEX`], the only index
    /// whose keys are unique and carry the kind prefix.
    pub fn new(
        client: Arc<dyn RemoteClient<R>>,
        cache: Arc<dyn Cache<E>>,
        strategy: Arc<dyn MergeStrategy<R, E>>,
        scope: Scope,
    ) -> Self {
        Self {
            client,
            cache,
            strategy,
            scope,
        }
    }

    /// Scope this reconciler lists.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Run one pass.
    ///
    /// The cache converges to exactly the listed objects of kind `R`; entries
    /// of other kinds are never visited. Nothing is written when the listing
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::List`] when the listing fails, [`Error::KeyDerivation`]
    /// when a listed object has no key, and [`Error::Cache`] for cache
    /// failures, including entries whose key cannot be derived.
    pub async fn reconcile(&self) -> Result<ReconcileOutcome> {
        let listing = self
            .client
            .list(&self.scope)
            .await
            .map_err(|source| Error::List {
                kind: R::KIND,
                source,
            })?;

        let derive = self.cache.key_deriver(PRIMARY_INDEX)?;
        let mut current = self.snapshot(&derive).await?;
        let mut stats = ReconcileStats::default();

        for object in listing.items {
            let object = normalize(object);
            let candidate = self.strategy.wrap(&object);
            let key = derive(&candidate)?.ok_or_else(|| {
                Error::key_derivation(
                    R::KIND,
                    format!("no key for listed object '{}'", object.metadata().name),
                )
            })?;

            match current.remove(&key) {
                Some(existing) => {
                    let changed = merge_into_cache(
                        self.cache.as_ref(),
                        self.strategy.as_ref(),
                        &object,
                        &existing,
                    )
                    .await?;
                    if changed {
                        stats.updated += 1;
                    } else {
                        stats.unchanged += 1;
                    }
                }
                None => {
                    self.cache.add(candidate).await?;
                    stats.added += 1;
                }
            }
        }

        for (key, entry) in current {
            self.cache.delete(&entry).await?;
            debug!(kind = R::KIND, key = %key, "Removed stale cache entry");
            stats.stale += 1;
        }

        info!(
            kind = R::KIND,
            scope = %self.scope,
            added = stats.added,
            updated = stats.updated,
            unchanged = stats.unchanged,
            stale = stats.stale,
            resource_version = %listing.resource_version,
            "Reconciled cache with remote listing"
        );

        Ok(ReconcileOutcome {
            stats,
            resource_version: listing.resource_version,
        })
    }

    /// Copy every cached entry of this kind, keyed by its derived key.
    async fn snapshot(&self, derive: &KeyDeriver<E>) -> Result<HashMap<String, E>> {
        let mut current = HashMap::new();
        self.cache
            .get(PRIMARY_INDEX, &kind_prefix::<R>(), &mut |entry: &E| {
                let key = derive(entry)?.ok_or_else(|| {
                    CacheError::key_derivation(PRIMARY_INDEX, "cached entry has no key")
                })?;
                current.insert(key, entry.clone());
                Ok(Visit::Continue)
            })
            .await?;
        Ok(current)
    }
}
