//! Concurrent response store keyed by request fingerprint.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::cache::freshness::CacheEntry;
use crate::request::Fingerprint;

/// Result of a store lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Within the soft TTL: serve without touching the network.
    Fresh(Arc<CacheEntry>),
    /// Past the soft TTL but within the hard TTL: serve and revalidate.
    Stale(Arc<CacheEntry>),
    Miss,
}

#[derive(Debug, Clone)]
struct Stored {
    entry: Arc<CacheEntry>,
    stored_at: Instant,
}

/// A thread-safe cache of response entries.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<DashMap<Fingerprint, Stored>>,
    max_entries: usize,
}

impl CacheStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn lookup(&self, key: &Fingerprint) -> Lookup {
        self.lookup_at(key, Instant::now())
    }

    /// Lookup as of `now`. Entries past their hard TTL are evicted.
    pub fn lookup_at(&self, key: &Fingerprint, now: Instant) -> Lookup {
        let (entry, age) = match self.inner.get(key) {
            Some(stored) => (stored.entry.clone(), now.saturating_duration_since(stored.stored_at)),
            None => return Lookup::Miss,
        };
        if age < Duration::from_secs(entry.soft_ttl_secs) {
            Lookup::Fresh(entry)
        } else if age < Duration::from_secs(entry.hard_ttl_secs) {
            Lookup::Stale(entry)
        } else {
            self.inner.remove(key);
            Lookup::Miss
        }
    }

    pub fn insert(&self, key: Fingerprint, entry: CacheEntry) -> Arc<CacheEntry> {
        self.insert_at(key, entry, Instant::now())
    }

    /// Store `entry` as of `now`, evicting the oldest entry when full.
    pub fn insert_at(&self, key: Fingerprint, entry: CacheEntry, now: Instant) -> Arc<CacheEntry> {
        if !self.inner.contains_key(&key) && self.inner.len() >= self.max_entries {
            self.evict_oldest();
        }
        let entry = Arc::new(entry);
        self.inner.insert(
            key,
            Stored {
                entry: entry.clone(),
                stored_at: now,
            },
        );
        entry
    }

    fn evict_oldest(&self) {
        let oldest = self
            .inner
            .iter()
            .min_by_key(|stored| stored.value().stored_at)
            .map(|stored| stored.key().clone());
        if let Some(key) = oldest {
            tracing::debug!(key = %key, "Cache full, evicting oldest entry");
            self.inner.remove(&key);
        }
    }

    pub fn remove(&self, key: &Fingerprint) -> Option<Arc<CacheEntry>> {
        self.inner.remove(key).map(|(_, stored)| stored.entry)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}
