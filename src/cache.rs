//! Result cache for repeated queries
//!
//! Entries expire after an hour. The collection is capped at 100
//! entries; when an insert goes over the cap the single oldest entry is
//! dropped. A linear scan finds it, which is fine at this size.

use crate::record::EmailRecord;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_CAPACITY: usize = 100;

/// Identity of a query for caching purposes.
///
/// Includes the result limit so a result set sized for one request is
/// never served to a request with a different limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub text: String,
    pub include_personal: bool,
    pub include_shared: bool,
    pub max_results: usize,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    results: Vec<EmailRecord>,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct SearchCache {
    entries: HashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    capacity: usize,
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}

impl SearchCache {
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity,
        }
    }

    /// Cached results for `key`, if stored less than the TTL ago.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<&[EmailRecord]> {
        self.entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.results.as_slice())
    }

    /// Store `results` under `key`, evicting the oldest entry if the
    /// cache grows past capacity.
    pub fn put(&mut self, key: CacheKey, results: Vec<EmailRecord>) {
        self.entries.insert(
            key,
            CacheEntry {
                results,
                stored_at: Instant::now(),
            },
        );

        if self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                debug!("Evicting cached results for '{}'", oldest.text);
                self.entries.remove(&oldest);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
