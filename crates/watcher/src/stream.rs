//! Change-stream consumer: applies incremental events to the cache.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use mirror_cache::Cache;
use tracing::debug;

use crate::client::ChangeStream;
use crate::error::{Error, Result};
use crate::strategy::{merge_into_cache, MergeStrategy};
use crate::types::{normalize, Resource, WatchEvent};

/// Why a consumer returned without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The remote closed the stream.
    Exhausted,
    /// Shutdown was requested.
    Shutdown,
}

/// Applies change events of kind `R` to the cache.
pub struct StreamConsumer<R, E> {
    cache: Arc<dyn Cache<E>>,
    strategy: Arc<dyn MergeStrategy<R, E>>,
}

impl<R, E> StreamConsumer<R, E>
where
    R: Resource,
    E: Clone + Send + Sync + 'static,
{
    /// Create a consumer writing through `strategy` into `cache`.
    pub fn new(cache: Arc<dyn Cache<E>>, strategy: Arc<dyn MergeStrategy<R, E>>) -> Self {
        Self { cache, strategy }
    }

    /// Consume `stream` until it ends, fails, or `shutdown` completes.
    ///
    /// `on_ready` runs once, right before the first event is read. Shutdown
    /// takes priority over pending events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamError`] for an error event,
    /// [`Error::MalformedEvent`] for an undecodable payload, and cache errors
    /// raised while applying an event.
    pub async fn consume<S, F>(
        &self,
        mut stream: ChangeStream<R>,
        on_ready: F,
        shutdown: S,
    ) -> Result<StreamEnd>
    where
        S: Future<Output = ()> + Send,
        F: FnOnce() + Send,
    {
        tokio::pin!(shutdown);
        on_ready();

        loop {
            let item = tokio::select! {
                biased;
                () = &mut shutdown => return Ok(StreamEnd::Shutdown),
                item = stream.next() => item,
            };
            let Some(item) = item else {
                return Ok(StreamEnd::Exhausted);
            };
            let event = item.map_err(|source| Error::MalformedEvent {
                kind: R::KIND,
                source,
            })?;
            self.apply(event).await?;
        }
    }

    /// Apply a single event.
    ///
    /// # Errors
    ///
    /// Fails on error events and on cache failures. A `Modified` event for an
    /// object that is not cached fails with a cache `NotFound` error.
    pub async fn apply(&self, event: WatchEvent<R>) -> Result<()> {
        let event_type = event.event_type();
        match event {
            WatchEvent::Error(status) => Err(Error::StreamError {
                kind: R::KIND,
                status,
            }),
            WatchEvent::Added(object) => {
                let object = normalize(object);
                log_event(event_type, &object);
                self.cache.add(self.strategy.wrap(&object)).await?;
                Ok(())
            }
            WatchEvent::Modified(object) => {
                let object = normalize(object);
                log_event(event_type, &object);
                let candidate = self.strategy.wrap(&object);
                let changed = merge_into_cache(
                    self.cache.as_ref(),
                    self.strategy.as_ref(),
                    &object,
                    &candidate,
                )
                .await?;
                if !changed {
                    debug!(
                        kind = R::KIND,
                        name = %object.metadata().name,
                        "Modification left entry unchanged"
                    );
                }
                Ok(())
            }
            WatchEvent::Deleted(object) => {
                let object = normalize(object);
                log_event(event_type, &object);
                let existed = self.cache.delete(&self.strategy.wrap(&object)).await?;
                if !existed {
                    debug!(
                        kind = R::KIND,
                        name = %object.metadata().name,
                        "Deleted object was not cached"
                    );
                }
                Ok(())
            }
        }
    }
}

fn log_event<R: Resource>(event_type: &'static str, object: &R) {
    let meta = object.metadata();
    debug!(
        kind = R::KIND,
        event_type,
        namespace = meta.namespace.as_deref().unwrap_or_default(),
        name = %meta.name,
        resource_version = %meta.resource_version,
        "Applying change event"
    );
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::future;

    use futures::stream;
    use mirror_cache::{CacheError, InMemoryCache};

    use super::*;
    use crate::error::ClientError;
    use crate::strategy::IdentityStrategy;
    use crate::types::fixtures::{address, untyped_address, Address};
    use crate::types::{resource_key_deriver, ErrorStatus};

    fn consumer(cache: &Arc<InMemoryCache<Address>>) -> StreamConsumer<Address, Address> {
        StreamConsumer::new(cache.clone(), Arc::new(IdentityStrategy))
    }

    fn new_cache() -> Arc<InMemoryCache<Address>> {
        Arc::new(InMemoryCache::new(resource_key_deriver()))
    }

    fn feed(events: Vec<WatchEvent<Address>>) -> ChangeStream<Address> {
        stream::iter(events.into_iter().map(Ok)).boxed()
    }

    #[tokio::test]
    async fn test_exhausted_stream_applies_every_event() {
        let cache = new_cache();
        let mut ready = false;

        let end = consumer(&cache)
            .consume(
                feed(vec![
                    WatchEvent::Added(untyped_address("ns", "a", "standard")),
                    WatchEvent::Added(address("ns", "b", "standard")),
                    WatchEvent::Modified(address("ns", "b", "premium")),
                    WatchEvent::Deleted(address("ns", "a", "standard")),
                ]),
                || ready = true,
                future::pending(),
            )
            .await
            .unwrap();

        assert_eq!(end, StreamEnd::Exhausted);
        assert!(ready);
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_identical_modification_does_not_write() {
        let cache = new_cache();
        let object = address("ns", "a", "standard");
        cache.add(object.clone()).await.unwrap();

        consumer(&cache)
            .apply(WatchEvent::Modified(object))
            .await
            .unwrap();

        assert_eq!(cache.mutations(), 1);
    }

    #[tokio::test]
    async fn test_added_then_deleted_leaves_no_entry() {
        let cache = new_cache();
        let consumer = consumer(&cache);

        consumer
            .apply(WatchEvent::Added(address("ns", "a", "standard")))
            .await
            .unwrap();
        consumer
            .apply(WatchEvent::Deleted(address("ns", "a", "standard")))
            .await
            .unwrap();

        assert!(cache.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_error_event_fails_the_stream() {
        let cache = new_cache();

        let result = consumer(&cache)
            .consume(
                feed(vec![
                    WatchEvent::Added(address("ns", "a", "standard")),
                    WatchEvent::Error(ErrorStatus::new(410, "gone")),
                    WatchEvent::Added(address("ns", "b", "standard")),
                ]),
                || {},
                future::pending(),
            )
            .await;

        assert!(matches!(
            result,
            Err(Error::StreamError { status, .. }) if status.code == 410
        ));
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_fails_the_stream() {
        let cache = new_cache();
        let items: Vec<crate::client::StreamItem<Address>> =
            vec![Err(ClientError::Decode("expected Address".to_string()))];

        let result = consumer(&cache)
            .consume(stream::iter(items).boxed(), || {}, future::pending())
            .await;

        assert!(matches!(result, Err(Error::MalformedEvent { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_wins_over_pending_events() {
        let cache = new_cache();

        let end = consumer(&cache)
            .consume(
                feed(vec![WatchEvent::Added(address("ns", "a", "standard"))]),
                || {},
                future::ready(()),
            )
            .await
            .unwrap();

        assert_eq!(end, StreamEnd::Shutdown);
        assert!(cache.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_modification_of_uncached_object_fails() {
        let cache = new_cache();

        let result = consumer(&cache)
            .apply(WatchEvent::Modified(address("ns", "a", "standard")))
            .await;

        assert!(matches!(
            result,
            Err(Error::Cache(CacheError::NotFound { .. }))
        ));
    }
}
