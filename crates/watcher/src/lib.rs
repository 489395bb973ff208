//! List/watch engine mirroring a remote resource collection into a local cache.
//!
//! One [`Watcher`] per resource kind keeps the cache entries of that kind
//! consistent with the remote store:
//!
//! - **Reconciliation pass**: full listing diffed against the cache, adding,
//!   updating and removing entries until the cache matches the listing
//! - **Change-stream consumer**: incremental events applied from the listing's
//!   resource version onwards
//! - **Lifecycle**: restart from a fresh listing on any failure, a once-only
//!   readiness signal, and cooperative shutdown
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mirror_cache::InMemoryCache;
//! use mirror_watcher::{resource_key_deriver, InMemoryRemote, Watcher};
//!
//! #[tokio::main]
//! async fn main() -> mirror_watcher::Result<()> {
//!     let remote = Arc::new(InMemoryRemote::<Address>::new());
//!     let cache = Arc::new(InMemoryCache::new(resource_key_deriver::<Address>()));
//!
//!     let watcher = Watcher::<Address>::builder()
//!         .with_client(remote)
//!         .with_cache(cache)
//!         .namespace("messaging")
//!         .build()?;
//!
//!     watcher.watch()?;
//!     watcher.await_ready().await?;
//!     watcher.shutdown().await;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod client;
pub mod config;
pub mod error;
pub mod group;
pub mod reconcile;
mod signal;
pub mod strategy;
pub mod stream;
pub mod types;
pub mod watcher;

// Re-export main types
pub use client::{ChangeStream, InMemoryRemote, RemoteClient, StreamItem};
pub use config::WatcherConfig;
pub use error::{ClientError, Error, Result};
pub use group::{ResourceWatcher, WatcherGroup};
pub use reconcile::{ReconcileOutcome, ReconcileStats, Reconciler};
pub use strategy::{FnStrategy, IdentityStrategy, MergeStrategy};
pub use stream::{StreamConsumer, StreamEnd};
pub use types::{
    kind_prefix, normalize, resource_key, resource_key_deriver, ErrorStatus, ObjectMeta,
    Resource, ResourceList, Scope, TypeMeta, WatchEvent,
};
pub use watcher::{Watcher, WatcherBuilder, WatcherState, WatcherStatus};

pub use mirror_cache::{Cache, CacheError, InMemoryCache, KeyDeriver, Visit, PRIMARY_INDEX};
