//! Stale-time cache for read queries.
//!
//! DESIGN
//! ======
//! Values stay fresh for `stale_time` after they were fetched. A stale or
//! missing entry is reloaded through the caller's loader; only successes are
//! cached. Keys are free-form, typically the request path.
//!
//! Loads are serialized per key: a caller that misses while another load of
//! the same key is running waits for it and then re-reads the cache. If that
//! load failed, the waiter runs its own.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as LoadGate;

use crate::error::ApiError;

struct CachedEntry {
    value: serde_json::Value,
    fetched_at: Instant,
}

pub struct QueryCache {
    entries: Mutex<HashMap<String, CachedEntry>>,
    loads: Mutex<HashMap<String, Arc<LoadGate<()>>>>,
    stale_time: Duration,
}

impl QueryCache {
    #[must_use]
    pub fn new(stale_time: Duration) -> Self {
        Self { entries: Mutex::new(HashMap::new()), loads: Mutex::new(HashMap::new()), stale_time }
    }

    #[must_use]
    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    /// Cached value for `key` if it is still fresh.
    #[must_use]
    pub fn get_fresh(&self, key: &str) -> Option<serde_json::Value> {
        self.get_fresh_at(key, Instant::now())
    }

    /// Internal: freshness check with explicit timestamp (for testing).
    fn get_fresh_at(&self, key: &str, now: Instant) -> Option<serde_json::Value> {
        let entries = self.lock();
        let entry = entries.get(key)?;
        (now.saturating_duration_since(entry.fetched_at) < self.stale_time).then(|| entry.value.clone())
    }

    pub fn insert(&self, key: &str, value: serde_json::Value) {
        self.insert_at(key, value, Instant::now());
    }

    fn insert_at(&self, key: &str, value: serde_json::Value, fetched_at: Instant) {
        self.lock()
            .insert(key.to_owned(), CachedEntry { value, fetched_at });
    }

    pub fn invalidate(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Drop every entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) {
        self.lock().retain(|key, _| !key.starts_with(prefix));
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Return the fresh cached value or run `load` and cache its success.
    ///
    /// # Errors
    ///
    /// Returns the loader's error; nothing is cached in that case.
    pub async fn fetch<F, Fut>(&self, key: &str, load: F) -> Result<serde_json::Value, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<serde_json::Value, ApiError>>,
    {
        if let Some(value) = self.get_fresh(key) {
            tracing::trace!(key, "query cache hit");
            return Ok(value);
        }

        let gate = self.load_gate(key);
        let _loading = gate.lock().await;
        let outcome = if let Some(value) = self.get_fresh(key) {
            tracing::trace!(key, "query loaded by concurrent caller");
            Ok(value)
        } else {
            let loaded = load().await;
            if let Ok(value) = &loaded {
                self.insert(key, value.clone());
            }
            loaded
        };
        self.release_gate(key, &gate);
        outcome
    }

    fn load_gate(&self, key: &str) -> Arc<LoadGate<()>> {
        let mut loads = self.loads.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(loads.entry(key.to_owned()).or_default())
    }

    /// Forget the gate once the last caller holding it is done.
    fn release_gate(&self, key: &str, gate: &Arc<LoadGate<()>>) {
        let mut loads = self.loads.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = loads
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, gate) && Arc::strong_count(gate) == 2);
        if idle {
            loads.remove(key);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "query_test.rs"]
mod tests;
