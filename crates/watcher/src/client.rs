//! Remote client trait and an in-memory remote for testing.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};
use itertools::Itertools;
use tokio::sync::Mutex;

use crate::error::ClientError;
use crate::types::{ErrorStatus, Resource, ResourceList, Scope, WatchEvent};

/// One item of a change stream. An `Err` is a payload that could not be decoded.
pub type StreamItem<R> = std::result::Result<WatchEvent<R>, ClientError>;

/// Incremental change feed. The stream ending is a graceful end.
pub type ChangeStream<R> = BoxStream<'static, StreamItem<R>>;

/// Client for the remote authoritative store.
#[async_trait]
pub trait RemoteClient<R: Resource>: Send + Sync {
    /// Fetch every object in `scope`, along with the listing's version.
    async fn list(&self, scope: &Scope) -> Result<ResourceList<R>, ClientError>;

    /// Open a change stream for `scope` starting right after `resource_version`.
    async fn watch(
        &self,
        scope: &Scope,
        resource_version: &str,
    ) -> Result<ChangeStream<R>, ClientError>;
}

/// Changes kept for replay by default.
pub const DEFAULT_CHANGE_HISTORY: usize = 1024;

struct OpenStream<R> {
    scope: Scope,
    sender: mpsc::UnboundedSender<StreamItem<R>>,
}

struct RemoteState<R> {
    items: BTreeMap<(String, String), R>,
    version: u64,
    changes: VecDeque<(u64, WatchEvent<R>)>,
    history: usize,
    /// Newest version evicted from `changes`. Streams must start at or after it.
    compacted: u64,
    stream: Option<OpenStream<R>>,
    list_failures: VecDeque<ClientError>,
    watch_failures: VecDeque<ClientError>,
    last_watch_version: Option<String>,
}

impl<R: Resource> RemoteState<R> {
    fn new() -> Self {
        Self {
            items: BTreeMap::new(),
            version: 0,
            changes: VecDeque::new(),
            history: DEFAULT_CHANGE_HISTORY,
            compacted: 0,
            stream: None,
            list_failures: VecDeque::new(),
            watch_failures: VecDeque::new(),
            last_watch_version: None,
        }
    }

    fn stamp(&mut self, object: &mut R) -> u64 {
        self.version += 1;
        object.metadata_mut().resource_version = self.version.to_string();
        self.version
    }

    fn record(&mut self, version: u64, event: WatchEvent<R>) -> bool {
        self.changes.push_back((version, event.clone()));
        while self.changes.len() > self.history {
            if let Some((evicted, _)) = self.changes.pop_front() {
                self.compacted = evicted;
            }
        }
        self.publish(Ok(event))
    }

    fn publish(&mut self, item: StreamItem<R>) -> bool {
        let Some(stream) = &self.stream else {
            return false;
        };
        if let Ok(WatchEvent::Added(o) | WatchEvent::Modified(o) | WatchEvent::Deleted(o)) = &item {
            if !stream.scope.contains(o.metadata().namespace.as_deref()) {
                return false;
            }
        }
        if stream.sender.unbounded_send(item).is_ok() {
            return true;
        }
        self.stream = None;
        false
    }
}

fn object_id<R: Resource>(object: &R) -> (String, String) {
    let meta = object.metadata();
    (meta.namespace.clone().unwrap_or_default(), meta.name.clone())
}

fn event_object<R>(event: &WatchEvent<R>) -> Option<&R> {
    match event {
        WatchEvent::Added(o) | WatchEvent::Modified(o) | WatchEvent::Deleted(o) => Some(o),
        WatchEvent::Error(_) => None,
    }
}

/// Scripted in-process remote store.
///
/// Holds the authoritative item set and a monotonically increasing resource
/// version. `create`/`update`/`delete` mutate the set and push the matching
/// event to the open change stream; a stream opened at version `v` first
/// replays every recorded change newer than `v`. Only the most recent changes
/// are kept, so opening a stream at a version older than the retained history
/// (or at one that is not a version at all) fails with status 410. Faults are
/// scripted with `fail_next_list`, `fail_next_watch`, `emit_error` and
/// `emit_malformed`.
pub struct InMemoryRemote<R> {
    state: Mutex<RemoteState<R>>,
    list_calls: AtomicU64,
    watch_calls: AtomicU64,
}

impl<R: Resource> InMemoryRemote<R> {
    /// Create an empty remote.
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    /// Create a remote already holding `items`.
    pub fn with_items(items: impl IntoIterator<Item = R>) -> Self {
        let mut state = RemoteState::new();
        for mut object in items {
            state.stamp(&mut object);
            state.items.insert(object_id(&object), object);
        }
        Self {
            state: Mutex::new(state),
            list_calls: AtomicU64::new(0),
            watch_calls: AtomicU64::new(0),
        }
    }

    /// Keep at most `history` changes for replay. Zero keeps none.
    #[must_use]
    pub fn with_history(mut self, history: usize) -> Self {
        self.state.get_mut().history = history;
        self
    }

    /// Store a new object and announce it as `ADDED`. Returns the stored object.
    pub async fn create(&self, mut object: R) -> R {
        let mut state = self.state.lock().await;
        let version = state.stamp(&mut object);
        state.items.insert(object_id(&object), object.clone());
        state.record(version, WatchEvent::Added(object.clone()));
        object
    }

    /// Replace an object and announce it as `MODIFIED`. Returns the stored object.
    pub async fn update(&self, mut object: R) -> R {
        let mut state = self.state.lock().await;
        let version = state.stamp(&mut object);
        state.items.insert(object_id(&object), object.clone());
        state.record(version, WatchEvent::Modified(object.clone()));
        object
    }

    /// Remove an object and announce it as `DELETED`.
    pub async fn delete(&self, namespace: Option<&str>, name: &str) -> Option<R> {
        let mut state = self.state.lock().await;
        let id = (namespace.unwrap_or_default().to_owned(), name.to_owned());
        let mut object = state.items.remove(&id)?;
        let version = state.stamp(&mut object);
        state.record(version, WatchEvent::Deleted(object.clone()));
        Some(object)
    }

    /// Push a raw event to the open stream without touching the item set.
    ///
    /// Returns whether a stream received it.
    pub async fn emit(&self, event: WatchEvent<R>) -> bool {
        self.state.lock().await.publish(Ok(event))
    }

    /// Push an error event to the open stream.
    pub async fn emit_error(&self, status: ErrorStatus) -> bool {
        self.emit(WatchEvent::Error(status)).await
    }

    /// Push an undecodable payload to the open stream.
    pub async fn emit_malformed(&self, reason: impl Into<String>) -> bool {
        self.state
            .lock()
            .await
            .publish(Err(ClientError::Decode(reason.into())))
    }

    /// End the open stream gracefully. Returns whether one was open.
    pub async fn close_stream(&self) -> bool {
        self.state.lock().await.stream.take().is_some()
    }

    /// Whether a consumer is still attached to the open stream.
    pub async fn is_streaming(&self) -> bool {
        self.state
            .lock()
            .await
            .stream
            .as_ref()
            .is_some_and(|s| !s.sender.is_closed())
    }

    /// Make the next `list` call fail with `error`.
    pub async fn fail_next_list(&self, error: ClientError) {
        self.state.lock().await.list_failures.push_back(error);
    }

    /// Make the next `watch` call fail with `error`.
    pub async fn fail_next_watch(&self, error: ClientError) {
        self.state.lock().await.watch_failures.push_back(error);
    }

    /// Version passed to the most recent `watch` call.
    pub async fn last_watch_version(&self) -> Option<String> {
        self.state.lock().await.last_watch_version.clone()
    }

    /// Current version of the collection.
    pub async fn resource_version(&self) -> String {
        self.state.lock().await.version.to_string()
    }

    /// Number of `list` calls so far.
    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::Acquire)
    }

    /// Number of `watch` calls so far.
    pub fn watch_calls(&self) -> u64 {
        self.watch_calls.load(Ordering::Acquire)
    }
}

impl<R: Resource> Default for InMemoryRemote<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Resource> RemoteClient<R> for InMemoryRemote<R> {
    async fn list(&self, scope: &Scope) -> Result<ResourceList<R>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::AcqRel);
        let mut state = self.state.lock().await;
        if let Some(error) = state.list_failures.pop_front() {
            return Err(error);
        }
        let items = state
            .items
            .values()
            .filter(|o| scope.contains(o.metadata().namespace.as_deref()))
            .cloned()
            .collect_vec();
        Ok(ResourceList {
            items,
            resource_version: state.version.to_string(),
        })
    }

    async fn watch(
        &self,
        scope: &Scope,
        resource_version: &str,
    ) -> Result<ChangeStream<R>, ClientError> {
        self.watch_calls.fetch_add(1, Ordering::AcqRel);
        let mut state = self.state.lock().await;
        if let Some(error) = state.watch_failures.pop_front() {
            return Err(error);
        }
        state.last_watch_version = Some(resource_version.to_owned());
        let from = resource_version
            .parse::<u64>()
            .map_err(|_| ClientError::Status {
                code: 410,
                message: format!("invalid resource version '{resource_version}'"),
            })?;
        if from < state.compacted {
            return Err(ClientError::Status {
                code: 410,
                message: format!(
                    "resource version {from} is too old, history starts at {}",
                    state.compacted
                ),
            });
        }

        let (sender, receiver) = mpsc::unbounded();
        let backlog = state
            .changes
            .iter()
            .filter(|(version, _)| *version > from)
            .filter(|(_, event)| {
                event_object(event)
                    .is_some_and(|o| scope.contains(o.metadata().namespace.as_deref()))
            })
            .map(|(_, event)| event.clone())
            .collect_vec();
        for event in backlog {
            if sender.unbounded_send(Ok(event)).is_err() {
                break;
            }
        }
        state.stream = Some(OpenStream {
            scope: scope.clone(),
            sender,
        });
        Ok(receiver.boxed())
    }
}
