// TTL query cache with lazy expiry and per-key single-flight on misses.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Stored entries, including ones that expired but were not yet overwritten.
    pub size: usize,
    /// Fractional, so sub-second TTLs are not reported as zero.
    pub ttl_seconds: f64,
}

/// Maps a key to a previously computed value for `ttl`.
///
/// Expired entries are treated as absent on read; there is no background sweep.
/// Concurrent misses for the same key run `fetch` once: later callers wait for the
/// first and read its result. A failed fetch is never cached, so waiters behind a
/// failure run their own fetch.
pub struct QueryCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<V: Clone> QueryCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Value for `key` if present and younger than the TTL.
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|e| e.inserted_at.elapsed() < self.ttl)
            .map(|e| e.value.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.lock().insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(v) = self.get(key) {
            tracing::trace!(key, "cache hit");
            return Ok(v);
        }

        let flight = FlightGuard::join(self, key);
        let _permit = flight.gate.lock().await;

        // Filled by the fetch we were queued behind.
        if let Some(v) = self.get(key) {
            tracing::trace!(key, "cache hit after in-flight fetch");
            return Ok(v);
        }

        tracing::debug!(key, "cache miss");
        let value = fetch().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn get_stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.lock().len(),
            ttl_seconds: self.ttl.as_secs_f64(),
        }
    }
}

impl<V: Clone> Default for QueryCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// Shares one gate per key between concurrent misses; removes it when the last holder leaves.
struct FlightGuard<'a, V> {
    cache: &'a QueryCache<V>,
    key: &'a str,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl<'a, V> FlightGuard<'a, V> {
    fn join(cache: &'a QueryCache<V>, key: &'a str) -> Self {
        let gate = cache
            .in_flight
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone();
        Self { cache, key, gate }
    }
}

impl<V> Drop for FlightGuard<'_, V> {
    fn drop(&mut self) {
        let mut in_flight = self.cache.in_flight.lock();
        // Clones only happen under this lock: map + self means nobody else is queued.
        if let Some(current) = in_flight.get(self.key)
            && Arc::ptr_eq(current, &self.gate)
            && Arc::strong_count(&self.gate) <= 2
        {
            in_flight.remove(self.key);
        }
    }
}
