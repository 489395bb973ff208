//! Running one watcher per resource kind behind a common interface.

use async_trait::async_trait;
use futures::future::{join_all, try_join_all};
use itertools::Itertools;
use tracing::info;

use crate::error::Result;
use crate::types::Resource;
use crate::watcher::{Watcher, WatcherState};

/// Object-safe view of a watcher's lifecycle.
#[async_trait]
pub trait ResourceWatcher: Send + Sync {
    /// Kind tag the watcher mirrors.
    fn kind(&self) -> &'static str;

    /// Start the background task.
    fn watch(&self) -> Result<()>;

    /// Wait for the first successful reconciliation.
    async fn await_ready(&self) -> Result<()>;

    /// Stop and wait for the background task to exit.
    async fn shutdown(&self);

    /// Current lifecycle state.
    fn state(&self) -> WatcherState;
}

#[async_trait]
impl<R, E> ResourceWatcher for Watcher<R, E>
where
    R: Resource,
    E: Clone + Send + Sync + 'static,
{
    fn kind(&self) -> &'static str {
        R::KIND
    }

    fn watch(&self) -> Result<()> {
        Watcher::watch(self)
    }

    async fn await_ready(&self) -> Result<()> {
        Watcher::await_ready(self).await
    }

    async fn shutdown(&self) {
        Watcher::shutdown(self).await;
    }

    fn state(&self) -> WatcherState {
        Watcher::state(self)
    }
}

/// A set of watchers started, awaited and stopped together.
#[derive(Default)]
pub struct WatcherGroup {
    watchers: Vec<Box<dyn ResourceWatcher>>,
}

impl WatcherGroup {
    /// Create an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a watcher.
    pub fn push(&mut self, watcher: impl ResourceWatcher + 'static) {
        self.watchers.push(Box::new(watcher));
    }

    /// Add a watcher, builder style.
    #[must_use]
    pub fn with(mut self, watcher: impl ResourceWatcher + 'static) -> Self {
        self.push(watcher);
        self
    }

    /// Start every watcher.
    ///
    /// # Errors
    ///
    /// Stops at the first watcher that fails to start; the ones before it
    /// keep running.
    pub fn watch_all(&self) -> Result<()> {
        for watcher in &self.watchers {
            watcher.watch()?;
        }
        info!(kinds = %self.kinds().join(","), "Started watchers");
        Ok(())
    }

    /// Wait until every watcher is ready.
    ///
    /// # Errors
    ///
    /// Returns the first error from any watcher's `await_ready`.
    pub async fn await_ready_all(&self) -> Result<()> {
        try_join_all(self.watchers.iter().map(|w| w.await_ready())).await?;
        Ok(())
    }

    /// Shut every watcher down concurrently.
    pub async fn shutdown_all(&self) {
        join_all(self.watchers.iter().map(|w| w.shutdown())).await;
        info!(count = self.watchers.len(), "All watchers stopped");
    }

    /// Kinds in insertion order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.watchers.iter().map(|w| w.kind()).collect_vec()
    }

    /// Number of watchers.
    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    /// Whether the group is empty.
    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }
}
