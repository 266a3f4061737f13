//! In-memory TTL cache with advisory priorities.
//!
//! Purely a latency layer: the engine stays correct with the cache
//! disabled or cold, only slower. TTL is checked lazily at read time,
//! and `get_or_set` guarantees a single in-flight compute per key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

/// Advisory eviction priority. Low-priority entries (derived summaries,
/// lookups) are dropped before plan snapshots under capacity pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
    priority: Priority,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > self.ttl
    }
}

/// Key/value cache shared across the engine's components.
///
/// Cheap to clone; clones share the same storage.
#[derive(Debug)]
pub struct Cache<V> {
    entries: Arc<Mutex<HashMap<String, Entry<V>>>>,
    inflight: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    capacity: usize,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            inflight: Arc::clone(&self.inflight),
            capacity: self.capacity,
        }
    }
}

impl<V: Clone> Cache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            inflight: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Returns the cached value, treating expired entries as misses
    /// (the expired entry is evicted on the spot).
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration, priority: Priority) {
        let key = key.into();
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.clone(),
            Entry {
                value,
                inserted_at: Instant::now(),
                ttl,
                priority,
            },
        );
        Self::enforce_capacity(&mut entries, self.capacity, &key);
    }

    pub fn remove(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-through: returns the cached value or runs `compute` and
    /// caches its result.
    ///
    /// At most one compute runs per key at a time; concurrent callers
    /// for the same missing key wait for the in-flight computation and
    /// then read its cached result instead of fetching again. Errors are
    /// not cached, so the next caller retries.
    pub async fn get_or_set<E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        priority: Priority,
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let key_lock = {
            let mut inflight = self.inflight.lock().unwrap();
            Arc::clone(
                inflight
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };

        let _guard = key_lock.lock().await;

        // A concurrent flight may have filled the entry while we waited.
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = compute().await?;
        self.set(key, value.clone(), ttl, priority);

        self.inflight.lock().unwrap().remove(key);
        Ok(value)
    }

    /// Drops expired entries first, then lowest priority, then oldest,
    /// until within capacity. The just-written key is never the victim.
    fn enforce_capacity(entries: &mut HashMap<String, Entry<V>>, capacity: usize, keep: &str) {
        if entries.len() <= capacity {
            return;
        }
        let now = Instant::now();
        entries.retain(|key, entry| key == keep || !entry.is_expired(now));

        while entries.len() > capacity {
            let victim = entries
                .iter()
                .filter(|(key, _)| key.as_str() != keep)
                .min_by_key(|(_, entry)| (entry.priority, entry.inserted_at))
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    tracing::debug!(key = %key, "cache evicting under capacity pressure");
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_get_miss_then_hit() {
        let cache: Cache<String> = Cache::new(8);
        assert!(cache.get("a").is_none());

        cache.set("a", "value".to_string(), TTL, Priority::Normal);
        assert_eq!(cache.get("a").as_deref(), Some("value"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_a_miss() {
        let cache: Cache<u32> = Cache::new(8);
        cache.set("a", 1, Duration::from_secs(5), Priority::Normal);

        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_drops_lowest_priority_then_oldest() {
        let cache: Cache<u32> = Cache::new(3);
        cache.set("low", 1, TTL, Priority::Low);
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.set("old-normal", 2, TTL, Priority::Normal);
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.set("new-normal", 3, TTL, Priority::Normal);
        tokio::time::advance(Duration::from_millis(10)).await;

        cache.set("high", 4, TTL, Priority::High);
        assert!(cache.get("low").is_none());
        assert_eq!(cache.len(), 3);

        cache.set("high2", 5, TTL, Priority::High);
        assert!(cache.get("old-normal").is_none());
        assert!(cache.get("new-normal").is_some());
    }

    #[tokio::test]
    async fn test_get_or_set_computes_once_per_key() {
        let cache: Cache<u32> = Cache::new(8);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_set("k", TTL, Priority::Normal, || {
                        let calls = Arc::clone(&calls);
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<u32, PlanError>(42)
                        }
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_set_error_is_not_cached() {
        let cache: Cache<u32> = Cache::new(8);

        let result = cache
            .get_or_set("k", TTL, Priority::Normal, || async {
                Err::<u32, PlanError>(PlanError::Network("down".into()))
            })
            .await;
        assert!(result.is_err());

        // The failed compute left no entry; the next compute runs.
        let result = cache
            .get_or_set("k", TTL, Priority::Normal, || async {
                Ok::<u32, PlanError>(7)
            })
            .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_clear_and_remove() {
        let cache: Cache<u32> = Cache::new(8);
        cache.set("a", 1, TTL, Priority::Normal);
        cache.set("b", 2, TTL, Priority::Normal);

        cache.remove("a");
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());

        cache.clear();
        assert!(cache.is_empty());
    }
}
