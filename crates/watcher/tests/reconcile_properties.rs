//! Property-based tests for the reconciliation pass using proptest.
//!
//! Properties verified:
//! - A second pass over an unchanged listing writes nothing
//! - After a pass the kind's keys are exactly the listed keys
//! - Pass counts account for every listed and every stale object

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use common::{address, address_cache, cached_keys, unwrap_result, Address};
use mirror_watcher::{
    Cache, IdentityStrategy, InMemoryCache, InMemoryRemote, ReconcileOutcome, Reconciler, Scope,
};
use proptest::prelude::*;

type Objects = BTreeMap<(String, String), String>;

/// Test helper: run a future on a fresh single-threaded runtime
fn block_on<F: std::future::Future>(future: F) -> F::Output {
    let rt = unwrap_result(
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build(),
        "runtime creation should succeed",
    );
    rt.block_on(future)
}

fn objects() -> impl Strategy<Value = Objects> {
    prop::collection::btree_map(("ns-[a-c]", "[a-e]{1,3}"), "(standard|premium)", 0..12)
}

fn addresses(objects: &Objects) -> Vec<Address> {
    objects
        .iter()
        .map(|((ns, name), plan)| address(ns, name, plan))
        .collect()
}

fn expected_keys(objects: &Objects) -> Vec<String> {
    objects
        .keys()
        .map(|(ns, name)| format!("Address/{ns}/{name}"))
        .collect()
}

async fn seed(cache: &InMemoryCache<Address>, objects: &Objects) {
    for mut object in addresses(objects) {
        object.type_meta.kind = "Address".to_string();
        unwrap_result(cache.add(object).await, "seeding should succeed");
    }
}

async fn pass(
    remote: &Arc<InMemoryRemote<Address>>,
    cache: &Arc<InMemoryCache<Address>>,
) -> ReconcileOutcome {
    let reconciler = Reconciler::new(
        remote.clone(),
        cache.clone(),
        Arc::new(IdentityStrategy),
        Scope::AllNamespaces,
    );
    unwrap_result(reconciler.reconcile().await, "pass should succeed")
}

// ==========================================================================
// PROPERTY: Idempotence
// ==========================================================================

proptest! {
    /// Property: Reconciling an already converged cache writes nothing.
    #[test]
    fn prop_second_pass_is_idempotent(initial in objects(), listed in objects()) {
        let (first, second, writes_between) = block_on(async {
            let remote = Arc::new(InMemoryRemote::with_items(addresses(&listed)));
            let cache = address_cache();
            seed(&cache, &initial).await;

            let first = pass(&remote, &cache).await;
            let writes = cache.mutations();
            let second = pass(&remote, &cache).await;
            (first, second, cache.mutations() - writes)
        });

        prop_assert!(second.stats.is_converged(), "second pass changed: {:?}", second.stats);
        prop_assert_eq!(second.stats.unchanged, listed.len());
        prop_assert_eq!(writes_between, 0);
        prop_assert_eq!(first.resource_version, second.resource_version);
    }
}

// ==========================================================================
// PROPERTY: Exact key-set convergence
// ==========================================================================

proptest! {
    /// Property: After a pass the cached keys of the kind equal the listed keys,
    /// whatever the cache held before.
    #[test]
    fn prop_pass_converges_to_listing(initial in objects(), listed in objects()) {
        let keys = block_on(async {
            let remote = Arc::new(InMemoryRemote::with_items(addresses(&listed)));
            let cache = address_cache();
            seed(&cache, &initial).await;

            pass(&remote, &cache).await;
            cached_keys(&*cache, "Address/").await
        });

        prop_assert_eq!(keys, expected_keys(&listed));
    }

    /// Property: Entries of other kinds survive any pass.
    #[test]
    fn prop_other_kinds_survive(others in objects(), listed in objects()) {
        let surviving = block_on(async {
            let remote = Arc::new(InMemoryRemote::with_items(addresses(&listed)));
            let cache = address_cache();
            for mut object in addresses(&others) {
                object.type_meta.kind = "AddressSpace".to_string();
                unwrap_result(cache.add(object).await, "seeding should succeed");
            }

            pass(&remote, &cache).await;
            cached_keys(&*cache, "AddressSpace/").await.len()
        });

        prop_assert_eq!(surviving, others.len());
    }
}

// ==========================================================================
// PROPERTY: Count accounting
// ==========================================================================

proptest! {
    /// Property: Every listed object is added, updated or unchanged, and
    /// every cached object missing from the listing is stale.
    #[test]
    fn prop_counts_account_for_every_object(initial in objects(), listed in objects()) {
        let outcome = block_on(async {
            let remote = Arc::new(InMemoryRemote::with_items(addresses(&listed)));
            let cache = address_cache();
            seed(&cache, &initial).await;
            pass(&remote, &cache).await
        });

        let initial_ids: BTreeSet<_> = initial.keys().collect();
        let listed_ids: BTreeSet<_> = listed.keys().collect();
        let stats = outcome.stats;

        prop_assert_eq!(stats.added + stats.updated + stats.unchanged, listed.len());
        prop_assert_eq!(stats.added, listed_ids.difference(&initial_ids).count());
        prop_assert_eq!(stats.stale, initial_ids.difference(&listed_ids).count());
    }
}
