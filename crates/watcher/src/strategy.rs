//! Identity/merge strategies: how remote objects become cache entries.

use mirror_cache::Cache;

use crate::error::Result;

/// Maps a remote object to its cached representation.
///
/// `merge` returns `true` only when it changed `existing`; returning `false`
/// means no write reaches the cache.
pub trait MergeStrategy<R, E>: Send + Sync {
    /// Build the entry stored for a freshly observed object.
    fn wrap(&self, object: &R) -> E;

    /// Bring `existing` up to date with `object`, reporting whether it changed.
    fn merge(&self, object: &R, existing: &mut E) -> bool;
}

/// Stores remote objects as they are, replacing them when they differ.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityStrategy;

impl<R> MergeStrategy<R, R> for IdentityStrategy
where
    R: Clone + PartialEq + Send + Sync,
{
    fn wrap(&self, object: &R) -> R {
        object.clone()
    }

    fn merge(&self, object: &R, existing: &mut R) -> bool {
        if existing == object {
            return false;
        }
        existing.clone_from(object);
        true
    }
}

/// Strategy assembled from a pair of closures.
///
/// Useful to cache a projection of each object instead of the object itself.
pub struct FnStrategy<W, M> {
    wrap: W,
    merge: M,
}

impl<W, M> FnStrategy<W, M> {
    /// Create a strategy from `wrap` and `merge` functions.
    pub const fn new(wrap: W, merge: M) -> Self {
        Self { wrap, merge }
    }
}

impl<R, E, W, M> MergeStrategy<R, E> for FnStrategy<W, M>
where
    W: Fn(&R) -> E + Send + Sync,
    M: Fn(&R, &mut E) -> bool + Send + Sync,
{
    fn wrap(&self, object: &R) -> E {
        (self.wrap)(object)
    }

    fn merge(&self, object: &R, existing: &mut E) -> bool {
        (self.merge)(object, existing)
    }
}

/// Merge `object` into the cached entry keyed like `existing`.
///
/// The strategy works on a copy of the stored entry, which replaces it only
/// when the strategy reports a change. Returns whether the cache was written.
pub(crate) async fn merge_into_cache<R, E>(
    cache: &dyn Cache<E>,
    strategy: &dyn MergeStrategy<R, E>,
    object: &R,
    existing: &E,
) -> Result<bool>
where
    R: Sync,
    E: Clone + Send + Sync + 'static,
{
    let replaced = cache
        .compare_and_update(
            &mut |current: &E| {
                let mut next = current.clone();
                Ok(strategy.merge(object, &mut next).then_some(next))
            },
            existing,
        )
        .await?;
    Ok(replaced)
}
