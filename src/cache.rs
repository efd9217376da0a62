//! Query cache: capacity-bounded map with access-order eviction and
//! per-entry TTL checked on read. Keys are md5 fingerprints of the
//! normalized query so trivially-rephrased whitespace/case variants hit.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::models::SourceRef;

#[derive(Debug, Clone)]
pub struct CachedAnswer {
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub cached_at: Instant,
}

#[derive(Debug)]
struct Entry {
    answer: CachedAnswer,
    last_access: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    #[serde(rename = "hitRate")]
    pub hit_rate: f64,
}

pub struct QueryCache {
    entries: Mutex<HashMap<String, Entry>>,
    max_size: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    clock: AtomicU64,
}

impl QueryCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_size: max_size.max(1),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            clock: AtomicU64::new(0),
        }
    }

    /// Fingerprint a query: lowercase, collapse whitespace, md5.
    pub fn fingerprint(query: &str) -> String {
        let normalized = query
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        format!("{:x}", md5::compute(normalized.as_bytes()))
    }

    pub fn get(&self, query: &str) -> Option<CachedAnswer> {
        let key = Self::fingerprint(query);
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(&key) {
            if entry.answer.cached_at.elapsed() <= self.ttl {
                entry.last_access = self.clock.fetch_add(1, Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.answer.clone());
            }
        }

        // Absent, or present but expired: drop any stale entry.
        entries.remove(&key);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn put(&self, query: &str, response: String, sources: Vec<SourceRef>) {
        let key = Self::fingerprint(query);
        let mut entries = self.entries.lock();

        if entries.len() >= self.max_size && !entries.contains_key(&key) {
            // Evict the least recently accessed entry.
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            Entry {
                answer: CachedAnswer {
                    response,
                    sources,
                    cached_at: Instant::now(),
                },
                last_access: self.clock.fetch_add(1, Ordering::Relaxed),
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            size: self.entries.lock().len(),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}
