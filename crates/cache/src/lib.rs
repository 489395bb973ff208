//! Indexed in-process cache backing resource mirrors.
//!
//! A single cache is shared by many watchers, one per resource kind. Entries
//! are stored under a primary key derived by the cache itself; watchers scan
//! their own kind by key prefix.
//!
//! - **Cache trait**: key derivation, prefix scans, add/delete and
//!   compare-and-update, each individually atomic
//! - **In-memory cache**: `RwLock`-guarded reference implementation with
//!   optional secondary indexes
//! - **Tracing cache**: decorator that logs every operation
//!
//! # Example
//!
//! ```ignore
//! use mirror_cache::{Cache, InMemoryCache, Visit, PRIMARY_INDEX};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = InMemoryCache::new(Arc::new(|name: &String| Ok(Some(format!("Note/{name}")))));
//!     cache.add("hello".to_string()).await.unwrap();
//!
//!     cache
//!         .get(PRIMARY_INDEX, "Note/", &mut |name: &String| {
//!             println!("{name}");
//!             Ok(Visit::Continue)
//!         })
//!         .await
//!         .unwrap();
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod cache;
pub mod error;
pub mod memory;
pub mod traced;

// Re-export main types
pub use cache::{Cache, KeyDeriver, MergeFn, Visit, Visitor, PRIMARY_INDEX};
pub use error::{CacheError, Result};
pub use memory::InMemoryCache;
pub use traced::TracingCache;
