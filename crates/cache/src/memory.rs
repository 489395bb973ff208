//! In-memory cache implementation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::{Cache, KeyDeriver, MergeFn, Visit, Visitor, PRIMARY_INDEX};
use crate::error::{CacheError, Result};

/// Secondary index contents as `(index key, primary key)` pairs.
type SecondaryIndex = BTreeSet<(String, String)>;

/// Index name paired with the entry's key under it.
type Link = (String, String);

struct Entries<E> {
    primary: BTreeMap<String, E>,
    secondary: HashMap<String, SecondaryIndex>,
}

impl<E> Entries<E> {
    fn new() -> Self {
        Self {
            primary: BTreeMap::new(),
            secondary: HashMap::new(),
        }
    }

    fn link(&mut self, links: Vec<Link>, key: &str) {
        for (index, index_key) in links {
            self.secondary
                .entry(index)
                .or_default()
                .insert((index_key, key.to_owned()));
        }
    }

    fn unlink(&mut self, links: &[Link], key: &str) {
        for (index, index_key) in links {
            if let Some(set) = self.secondary.get_mut(index) {
                set.remove(&(index_key.clone(), key.to_owned()));
            }
        }
    }
}

/// In-memory cache keyed by the primary index, with optional secondary indexes.
///
/// `add` is an upsert. `delete` of a missing entry reports `false`.
/// `compare_and_update` of a missing entry fails with [`CacheError::NotFound`].
pub struct InMemoryCache<E> {
    primary: KeyDeriver<E>,
    secondary: BTreeMap<String, KeyDeriver<E>>,
    entries: RwLock<Entries<E>>,
    mutations: AtomicU64,
}

impl<E> InMemoryCache<E>
where
    E: Send + Sync + 'static,
{
    /// Create a cache whose primary index uses `primary`.
    pub fn new(primary: KeyDeriver<E>) -> Self {
        Self {
            primary,
            secondary: BTreeMap::new(),
            entries: RwLock::new(Entries::new()),
            mutations: AtomicU64::new(0),
        }
    }

    /// Register a secondary index.
    ///
    /// Entries for which `deriver` yields no key are left out of the index.
    #[must_use]
    pub fn with_index(mut self, name: impl Into<String>, deriver: KeyDeriver<E>) -> Self {
        self.secondary.insert(name.into(), deriver);
        self
    }

    /// Number of writes (adds, deletes and replacements) applied so far.
    pub fn mutations(&self) -> u64 {
        self.mutations.load(Ordering::Acquire)
    }

    fn primary_key(&self, entry: &E) -> Result<String> {
        (self.primary)(entry)?
            .ok_or_else(|| CacheError::key_derivation(PRIMARY_INDEX, "no key generated for entry"))
    }

    fn secondary_keys(&self, entry: &E) -> Result<Vec<Link>> {
        let mut links = Vec::with_capacity(self.secondary.len());
        for (index, deriver) in &self.secondary {
            if let Some(key) = deriver(entry)? {
                links.push((index.clone(), key));
            }
        }
        Ok(links)
    }

    fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::AcqRel);
    }
}

#[async_trait]
impl<E> Cache<E> for InMemoryCache<E>
where
    E: Send + Sync + 'static,
{
    fn key_deriver(&self, index: &str) -> Result<KeyDeriver<E>> {
        if index == PRIMARY_INDEX {
            return Ok(self.primary.clone());
        }
        self.secondary
            .get(index)
            .cloned()
            .ok_or_else(|| CacheError::unknown_index(index))
    }

    async fn get(&self, index: &str, prefix: &str, visitor: &mut Visitor<'_, E>) -> Result<()> {
        let entries = self.entries.read().await;

        if index == PRIMARY_INDEX {
            let matching = entries
                .primary
                .range(prefix.to_owned()..)
                .take_while(|(key, _)| key.starts_with(prefix));
            for (_, entry) in matching {
                if visitor(entry)? == Visit::Stop {
                    break;
                }
            }
            return Ok(());
        }

        if !self.secondary.contains_key(index) {
            return Err(CacheError::unknown_index(index));
        }
        let Some(set) = entries.secondary.get(index) else {
            return Ok(());
        };
        let matching = set
            .range((prefix.to_owned(), String::new())..)
            .take_while(|(index_key, _)| index_key.starts_with(prefix));
        for (_, key) in matching {
            if let Some(entry) = entries.primary.get(key) {
                if visitor(entry)? == Visit::Stop {
                    break;
                }
            }
        }
        Ok(())
    }

    async fn add(&self, entry: E) -> Result<()> {
        let key = self.primary_key(&entry)?;
        let new_links = self.secondary_keys(&entry)?;

        let mut entries = self.entries.write().await;
        let old_links = match entries.primary.get(&key) {
            Some(old) => self.secondary_keys(old)?,
            None => Vec::new(),
        };
        entries.unlink(&old_links, &key);
        entries.link(new_links, &key);
        entries.primary.insert(key, entry);
        self.record_mutation();
        Ok(())
    }

    async fn delete(&self, entry: &E) -> Result<bool> {
        let key = self.primary_key(entry)?;

        let mut entries = self.entries.write().await;
        let Some(current) = entries.primary.get(&key) else {
            return Ok(false);
        };
        let links = self.secondary_keys(current)?;
        entries.unlink(&links, &key);
        entries.primary.remove(&key);
        self.record_mutation();
        Ok(true)
    }

    async fn compare_and_update(&self, merge: &mut MergeFn<'_, E>, existing: &E) -> Result<bool> {
        let key = self.primary_key(existing)?;

        let mut entries = self.entries.write().await;
        let Some(current) = entries.primary.get(&key) else {
            return Err(CacheError::not_found(key));
        };
        let Some(replacement) = merge(current)? else {
            return Ok(false);
        };
        if self.primary_key(&replacement)? != key {
            return Err(CacheError::key_derivation(
                PRIMARY_INDEX,
                format!("replacement for '{key}' derives a different key"),
            ));
        }
        let old_links = self.secondary_keys(current)?;
        let new_links = self.secondary_keys(&replacement)?;

        entries.unlink(&old_links, &key);
        entries.link(new_links, &key);
        entries.primary.insert(key, replacement);
        self.record_mutation();
        Ok(true)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().await.primary.len())
    }
}
