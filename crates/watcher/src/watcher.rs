//! Watcher lifecycle: the list/watch restart loop, readiness and shutdown.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mirror_cache::Cache;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::client::RemoteClient;
use crate::config::WatcherConfig;
use crate::error::{Error, Result};
use crate::reconcile::{ReconcileStats, Reconciler};
use crate::signal::Latch;
use crate::strategy::{IdentityStrategy, MergeStrategy};
use crate::stream::{StreamConsumer, StreamEnd};
use crate::types::{Resource, Scope};

/// Lifecycle state of a watcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum WatcherState {
    /// Built, not started.
    #[default]
    Idle,
    /// Listing and diffing against the cache.
    Reconciling,
    /// Applying change events.
    Streaming,
    /// Shutdown requested, background task still running.
    ShuttingDown,
    /// Background task exited. Terminal.
    Stopped,
}

impl WatcherState {
    /// Whether the state is `ShuttingDown` or `Stopped`.
    pub const fn is_terminating(self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Stopped)
    }
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Reconciling => "reconciling",
            Self::Streaming => "streaming",
            Self::ShuttingDown => "shutting-down",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Observable progress of a watcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WatcherStatus {
    /// Current lifecycle state.
    pub state: WatcherState,
    /// Successful reconciliation passes.
    pub passes: u64,
    /// Cycles that ended in a restart.
    pub restarts: u64,
    /// Counts of the most recent successful pass.
    pub last_stats: Option<ReconcileStats>,
    /// Version of the most recent successful listing.
    pub resource_version: Option<String>,
}

struct Shared<R, E> {
    client: Arc<dyn RemoteClient<R>>,
    reconciler: Reconciler<R, E>,
    consumer: StreamConsumer<R, E>,
    scope: Scope,
    config: WatcherConfig,
    started: AtomicBool,
    ready: Latch,
    shutdown: Latch,
    stopped: Latch,
    status: watch::Sender<WatcherStatus>,
}

impl<R, E> Shared<R, E>
where
    R: Resource,
    E: Clone + Send + Sync + 'static,
{
    async fn run(self: Arc<Self>) {
        let _stopped = StoppedGuard(&self);
        info!(kind = R::KIND, scope = %self.scope, "Starting watcher");

        loop {
            if self.shutdown.is_fired() {
                break;
            }
            match self.cycle().await {
                Ok(StreamEnd::Shutdown) => break,
                Ok(StreamEnd::Exhausted) if !self.config.restart_on_stream_end => {
                    info!(kind = R::KIND, "Change stream ended, no more watching required");
                    break;
                }
                Ok(StreamEnd::Exhausted) => {
                    debug!(kind = R::KIND, "Change stream ended, relisting");
                }
                Err(err) if !err.is_restartable() => {
                    error!(kind = R::KIND, error = %err, "Watch cycle failed permanently");
                    break;
                }
                Err(err) => {
                    warn!(kind = R::KIND, error = %err, "Watch cycle failed, relisting");
                }
            }
            self.status.send_modify(|status| status.restarts += 1);
            if !self.pause().await {
                break;
            }
        }
    }

    /// One reconciliation pass followed by stream consumption.
    async fn cycle(&self) -> Result<StreamEnd> {
        self.set_state(WatcherState::Reconciling);
        let outcome = self.reconciler.reconcile().await?;
        self.status.send_modify(|status| {
            status.passes += 1;
            status.last_stats = Some(outcome.stats);
            status.resource_version = Some(outcome.resource_version.clone());
        });

        if self.shutdown.is_fired() {
            return Ok(StreamEnd::Shutdown);
        }

        let stream = self
            .client
            .watch(&self.scope, &outcome.resource_version)
            .await
            .map_err(|source| Error::Watch {
                kind: R::KIND,
                resource_version: outcome.resource_version.clone(),
                source,
            })?;

        self.set_state(WatcherState::Streaming);
        self.consumer
            .consume(stream, || self.mark_ready(), self.shutdown.wait())
            .await
    }

    /// Wait out the restart delay. Returns `false` when shutdown was requested.
    async fn pause(&self) -> bool {
        let delay = self.config.restart_delay();
        if delay.is_zero() {
            tokio::task::yield_now().await;
            return !self.shutdown.is_fired();
        }
        tokio::select! {
            biased;
            () = self.shutdown.wait() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    fn mark_ready(&self) {
        if self.ready.fire() {
            info!(kind = R::KIND, scope = %self.scope, "Watcher ready");
        }
    }

    /// Move to `state` unless the watcher is already terminating.
    fn set_state(&self, state: WatcherState) {
        self.status.send_if_modified(|status| {
            if status.state.is_terminating() || status.state == state {
                return false;
            }
            status.state = state;
            true
        });
    }

    fn request_stop(&self) {
        self.status.send_if_modified(|status| {
            if status.state.is_terminating() {
                return false;
            }
            status.state = WatcherState::ShuttingDown;
            true
        });
        if self.shutdown.fire() {
            info!(kind = R::KIND, "Watcher shutdown requested");
        }
    }

    fn finish(&self) {
        self.status.send_modify(|status| status.state = WatcherState::Stopped);
        if self.stopped.fire() {
            info!(kind = R::KIND, "Watcher stopped");
        }
    }
}

/// Fires the stopped signal when the background task exits, including by panic.
struct StoppedGuard<'a, R, E>(&'a Shared<R, E>)
where
    R: Resource,
    E: Clone + Send + Sync + 'static;

impl<R, E> Drop for StoppedGuard<'_, R, E>
where
    R: Resource,
    E: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Keeps the cache entries of one resource kind in sync with the remote store.
///
/// `watch()` launches a background task that lists the collection, reconciles
/// it into the cache, then applies the change stream opened at the listing's
/// version. Any failure restarts the cycle from a fresh listing. The task
/// stops when the stream ends gracefully or on `shutdown()`.
pub struct Watcher<R, E = R> {
    shared: Arc<Shared<R, E>>,
}

impl<R> Watcher<R, R>
where
    R: Resource + PartialEq,
{
    /// Builder for a watcher that caches objects as they are.
    pub fn builder() -> WatcherBuilder<R, R> {
        WatcherBuilder::new()
    }
}

impl<R, E> Watcher<R, E>
where
    R: Resource,
    E: Clone + Send + Sync + 'static,
{
    /// Kind tag this watcher mirrors.
    pub const fn kind(&self) -> &'static str {
        R::KIND
    }

    /// Scope this watcher mirrors.
    pub fn scope(&self) -> &Scope {
        &self.shared.scope
    }

    /// Start the background task and return immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] outside a tokio runtime,
    /// [`Error::AlreadyWatching`] when already started and [`Error::Stopped`]
    /// when shut down before being started.
    pub fn watch(&self) -> Result<()> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::invalid_config(format!("watch requires a tokio runtime: {e}")))?;
        if self.shared.started.swap(true, Ordering::AcqRel) {
            if self.shared.stopped.is_fired() && !self.shared.ready.is_fired() {
                return Err(Error::Stopped { kind: R::KIND });
            }
            return Err(Error::AlreadyWatching { kind: R::KIND });
        }

        self.shared.set_state(WatcherState::Reconciling);
        runtime.spawn(Arc::clone(&self.shared).run());
        Ok(())
    }

    /// Wait for the first successful reconciliation.
    ///
    /// Returns immediately once ready. Blocks for as long as every pass keeps
    /// failing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stopped`] if the watcher stopped without ever becoming
    /// ready.
    pub async fn await_ready(&self) -> Result<()> {
        tokio::select! {
            biased;
            () = self.shared.ready.wait() => Ok(()),
            () = self.shared.stopped.wait() => Err(Error::Stopped { kind: R::KIND }),
        }
    }

    /// Request shutdown and wait until the background task has exited.
    ///
    /// No cache write from this watcher happens after this returns. A watcher
    /// that was never started stops immediately and can no longer be started.
    pub async fn shutdown(&self) {
        if !self.shared.started.swap(true, Ordering::AcqRel) {
            self.shared.finish();
            return;
        }
        self.shared.request_stop();
        self.shared.stopped.wait().await;
    }

    /// Whether the first reconciliation completed.
    pub fn is_ready(&self) -> bool {
        self.shared.ready.is_fired()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WatcherState {
        self.shared.status.borrow().state
    }

    /// Snapshot of the watcher's progress.
    pub fn status(&self) -> WatcherStatus {
        self.shared.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn subscribe_status(&self) -> watch::Receiver<WatcherStatus> {
        self.shared.status.subscribe()
    }
}

impl<R, E> fmt::Debug for Watcher<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("scope", &self.shared.scope)
            .field("status", &*self.shared.status.borrow())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Watcher`].
pub struct WatcherBuilder<R, E = R> {
    client: Option<Arc<dyn RemoteClient<R>>>,
    cache: Option<Arc<dyn Cache<E>>>,
    strategy: Arc<dyn MergeStrategy<R, E>>,
    namespace: Option<String>,
    config: WatcherConfig,
}

impl<R> WatcherBuilder<R, R>
where
    R: Resource + PartialEq,
{
    /// Builder using [`IdentityStrategy`].
    pub fn new() -> Self {
        Self::projecting(IdentityStrategy)
    }
}

impl<R> Default for WatcherBuilder<R, R>
where
    R: Resource + PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R, E> WatcherBuilder<R, E>
where
    R: Resource,
    E: Clone + Send + Sync + 'static,
{
    /// Builder storing entries produced by `strategy`.
    pub fn projecting(strategy: impl MergeStrategy<R, E> + 'static) -> Self {
        Self {
            client: None,
            cache: None,
            strategy: Arc::new(strategy),
            namespace: None,
            config: WatcherConfig::default(),
        }
    }

    /// Set the remote client. Required.
    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn RemoteClient<R>>) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the cache. Required.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn Cache<E>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replace the merge strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl MergeStrategy<R, E> + 'static) -> Self {
        self.strategy = Arc::new(strategy);
        self
    }

    /// Watch a single namespace. Ignored for cluster-scoped kinds.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Watch every namespace. This is the default.
    #[must_use]
    pub fn all_namespaces(mut self) -> Self {
        self.namespace = None;
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn with_config(mut self, config: WatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the pause between a failed cycle and the next listing.
    #[must_use]
    pub fn restart_delay(mut self, delay: Duration) -> Self {
        self.config = self.config.with_restart_delay(delay);
        self
    }

    /// Relist after a graceful stream end instead of stopping.
    #[must_use]
    pub fn restart_on_stream_end(mut self, enabled: bool) -> Self {
        self.config.restart_on_stream_end = enabled;
        self
    }

    /// Build the watcher.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the client or cache is missing.
    pub fn build(self) -> Result<Watcher<R, E>> {
        let client = self
            .client
            .ok_or_else(|| Error::invalid_config("remote client is required"))?;
        let cache = self
            .cache
            .ok_or_else(|| Error::invalid_config("cache is required"))?;

        let scope = match self.namespace {
            Some(namespace) if R::NAMESPACED && !namespace.is_empty() => {
                Scope::Namespace(namespace)
            }
            _ => Scope::AllNamespaces,
        };

        let reconciler = Reconciler::new(
            Arc::clone(&client),
            Arc::clone(&cache),
            Arc::clone(&self.strategy),
            scope.clone(),
        );
        let consumer = StreamConsumer::new(cache, self.strategy);
        let (status, _) = watch::channel(WatcherStatus::default());

        Ok(Watcher {
            shared: Arc::new(Shared {
                client,
                reconciler,
                consumer,
                scope,
                config: self.config,
                started: AtomicBool::new(false),
                ready: Latch::new(),
                shutdown: Latch::new(),
                stopped: Latch::new(),
                status,
            }),
        })
    }
}
