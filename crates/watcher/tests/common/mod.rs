//! Shared fixtures for the watcher integration tests.

#![allow(dead_code, clippy::panic)]

use std::future::Future;
use std::sync::{Arc, Once};
use std::time::Duration;

use mirror_watcher::{
    resource_key, Cache, InMemoryCache, ObjectMeta, Resource, TypeMeta, Visit, PRIMARY_INDEX,
};
use serde::{Deserialize, Serialize};

static TRACING: Once = Once::new();

/// Route watcher logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Test helper: Unwrap a Result or panic with context
pub fn unwrap_result<T, E: std::fmt::Display>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("{context}: {e}"),
    }
}

/// Poll `check` until it holds, panicking after two seconds.
pub async fn eventually<F, Fut>(context: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {context}");
}

// ==========================================================================
// Resources
// ==========================================================================

/// Messaging address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    pub metadata: ObjectMeta,
    pub address: String,
    pub plan: String,
}

impl Resource for Address {
    const KIND: &'static str = "Address";

    fn type_meta(&self) -> &TypeMeta {
        &self.type_meta
    }

    fn type_meta_mut(&mut self) -> &mut TypeMeta {
        &mut self.type_meta
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// Address as list items usually arrive, without a kind tag.
pub fn address(namespace: &str, name: &str, plan: &str) -> Address {
    Address {
        type_meta: TypeMeta {
            kind: String::new(),
            api_version: "enmasse.io/v1beta1".to_string(),
        },
        metadata: ObjectMeta::namespaced(namespace, name),
        address: format!("queue/{name}"),
        plan: plan.to_string(),
    }
}

/// Tenant owning a set of addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSpace {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    pub metadata: ObjectMeta,
    pub space_type: String,
}

impl Resource for AddressSpace {
    const KIND: &'static str = "AddressSpace";

    fn type_meta(&self) -> &TypeMeta {
        &self.type_meta
    }

    fn type_meta_mut(&mut self) -> &mut TypeMeta {
        &mut self.type_meta
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

pub fn address_space(namespace: &str, name: &str, space_type: &str) -> AddressSpace {
    AddressSpace {
        type_meta: TypeMeta {
            kind: "AddressSpace".to_string(),
            api_version: "enmasse.io/v1beta1".to_string(),
        },
        metadata: ObjectMeta::namespaced(namespace, name),
        space_type: space_type.to_string(),
    }
}

// ==========================================================================
// Cache helpers
// ==========================================================================

/// Cache of addresses keyed by `kind/namespace/name`.
pub fn address_cache() -> Arc<InMemoryCache<Address>> {
    Arc::new(InMemoryCache::new(mirror_watcher::resource_key_deriver()))
}

/// Keys of every entry under `prefix`, in key order.
pub async fn cached_keys<E>(cache: &dyn Cache<E>, prefix: &str) -> Vec<String>
where
    E: Resource,
{
    let mut keys = Vec::new();
    unwrap_result(
        cache
            .get(PRIMARY_INDEX, prefix, &mut |entry: &E| {
                keys.extend(resource_key(entry));
                Ok(Visit::Continue)
            })
            .await,
        "cache scan should succeed",
    );
    keys
}

/// Cached address with the given key, if any.
pub async fn cached_address(cache: &dyn Cache<Address>, key: &str) -> Option<Address> {
    let mut found = None;
    unwrap_result(
        cache
            .get(PRIMARY_INDEX, key, &mut |entry: &Address| {
                if resource_key(entry).as_deref() == Some(key) {
                    found = Some(entry.clone());
                    return Ok(Visit::Stop);
                }
                Ok(Visit::Continue)
            })
            .await,
        "cache scan should succeed",
    );
    found
}
