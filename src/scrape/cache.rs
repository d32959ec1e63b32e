use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::models::Metadata;

pub const CACHE_TTL: Duration = Duration::from_millis(300_000);

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Metadata,
    fetched_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.fetched_at) < ttl
    }
}

/// In-memory metadata cache keyed by the exact requested URL.
///
/// Keys are not normalized: `https://a.com` and `https://a.com/` are two
/// entries. Timestamps come from the tokio clock so paused-time tests can
/// move past the TTL.
#[derive(Debug)]
pub struct MetadataCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh entry for `url`, if any. A stale entry is removed on the way out.
    pub fn get(&self, url: &str) -> Option<Metadata> {
        let now = Instant::now();
        let mut entries = self.entries();
        match entries.get(url) {
            Some(entry) if entry.is_fresh(now, self.ttl) => Some(entry.data.clone()),
            Some(_) => {
                entries.remove(url);
                None
            }
            None => None,
        }
    }

    /// Insert or replace the entry for `url`, stamped with the current time.
    pub fn put(&self, url: &str, data: Metadata) {
        self.entries().insert(
            url.to_string(),
            CacheEntry {
                data,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now, ttl));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
