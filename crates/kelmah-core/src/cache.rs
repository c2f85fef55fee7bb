// ── Request cache ──
//
// One concurrent map per resource type, keyed by `QueryKey`. Entries are
// replaced wholesale on every successful fetch and shared with consumers
// through an immutable `Arc` payload.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::trace;

use crate::normalize::Page;
use crate::resources::bids::Bid;
use crate::resources::locations::LocationSuggestion;
use crate::resources::proposals::Proposal;
use crate::resources::quick_jobs::QuickJob;
use crate::resources::workers::Worker;

/// A cached fetch result.
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub key: String,
    pub payload: Arc<Page<T>>,
    /// Monotonic fetch time, used for freshness.
    pub fetched_at: Instant,
    /// Wall-clock fetch time, for display.
    pub fetched_at_utc: DateTime<Utc>,
}

// Manual impl: cloning shares the payload and must not require `T: Clone`.
impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            payload: Arc::clone(&self.payload),
            fetched_at: self.fetched_at,
            fetched_at_utc: self.fetched_at_utc,
        }
    }
}

impl<T> CacheEntry<T> {
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// `true` while `now - fetched_at < ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

/// Storage contract for fetch results of one resource type.
pub trait CacheStore<T>: Send + Sync {
    fn get(&self, key: &str) -> Option<CacheEntry<T>>;

    /// Overwrite the entry for `key`, stamping it with the current time.
    fn set(&self, key: &str, payload: Arc<Page<T>>) -> CacheEntry<T>;

    /// Drop one entry, or every entry when `key` is `None`.
    fn invalidate(&self, key: Option<&str>);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_fresh(&self, entry: &CacheEntry<T>, ttl: Duration) -> bool {
        entry.is_fresh(ttl)
    }
}

/// In-memory [`CacheStore`] on a `DashMap`.
pub struct RequestCache<T> {
    entries: DashMap<String, CacheEntry<T>>,
}

impl<T> Default for RequestCache<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T> RequestCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current keys, unordered.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }
}

impl<T: Send + Sync> CacheStore<T> for RequestCache<T> {
    fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    fn set(&self, key: &str, payload: Arc<Page<T>>) -> CacheEntry<T> {
        let entry = CacheEntry {
            key: key.to_owned(),
            payload,
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
        };
        self.entries.insert(key.to_owned(), entry.clone());
        trace!(key, "cache entry stored");
        entry
    }

    fn invalidate(&self, key: Option<&str>) {
        match key {
            Some(key) => {
                self.entries.remove(key);
                trace!(key, "cache entry invalidated");
            }
            None => {
                self.entries.clear();
                trace!("cache cleared");
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// One cache per resource type, owned by the application root.
#[derive(Clone, Default)]
pub struct Caches {
    pub proposals: Arc<RequestCache<Proposal>>,
    pub workers: Arc<RequestCache<Worker>>,
    pub bids: Arc<RequestCache<Bid>>,
    pub quick_jobs: Arc<RequestCache<QuickJob>>,
    pub locations: Arc<RequestCache<LocationSuggestion>>,
}

impl Caches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cached entry of every resource.
    pub fn invalidate_all(&self) {
        self.proposals.invalidate(None);
        self.workers.invalidate(None);
        self.bids.invalidate(None);
        self.quick_jobs.invalidate(None);
        self.locations.invalidate(None);
    }
}
