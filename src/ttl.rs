//! Time-bounded map used by the read cache and the recent-decision cache.
//!
//! Entries carry the instant they were stored. Lookups ignore expired entries;
//! removal of expired entries only happens through [`TtlMap::sweep`] or an explicit
//! [`TtlMap::remove`].

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct TtlEntry<V> {
    value: V,
    stored_at: Instant,
}

#[derive(Debug, Clone)]
pub struct TtlMap<K, V> {
    entries: HashMap<K, TtlEntry<V>>,
    ttl: Duration,
}

impl<K: Eq + Hash, V> TtlMap<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&mut self, key: K, value: V, stored_at: Instant) {
        self.entries.insert(key, TtlEntry { value, stored_at });
    }

    /// Fresh value for `key`, if any.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| now.saturating_duration_since(entry.stored_at) < self.ttl)
            .map(|entry| &entry.value)
    }

    pub fn contains_fresh<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Instant the entry for `key` was stored, expired or not.
    pub fn stored_at<Q>(&self, key: &Q) -> Option<Instant>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).map(|entry| entry.stored_at)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Remove every entry whose key matches `predicate`.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&K) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key));
        before - self.entries.len()
    }

    /// Evict expired entries, returning how many were dropped.
    pub fn sweep(&mut self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.stored_at) < ttl);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }
}
