//! Bounded, time-expiring weather cache.
//!
//! Entries are evicted in original insertion order once the cache is full and
//! are dropped lazily when a lookup finds them older than the TTL. Replacing an
//! existing key keeps its place in the eviction order.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::error::WeatherError;
use crate::record::WeatherRecord;

// ------------------------------------------------------------------ //
//  Configuration                                                      //
// ------------------------------------------------------------------ //

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    capacity: usize,
    ttl: Duration,
}

impl CacheConfig {
    pub const DEFAULT_CAPACITY: usize = 10;
    pub const DEFAULT_TTL: Duration = Duration::from_millis(600_000);

    pub fn new(capacity: usize, ttl: Duration) -> Result<Self, WeatherError> {
        if capacity == 0 {
            return Err(WeatherError::Config("cache capacity must be > 0".into()));
        }
        if ttl.is_zero() {
            return Err(WeatherError::Config("cache ttl must be > 0".into()));
        }
        Ok(Self { capacity, ttl })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: Self::DEFAULT_CAPACITY,
            ttl: Self::DEFAULT_TTL,
        }
    }
}

// ------------------------------------------------------------------ //
//  Cache                                                              //
// ------------------------------------------------------------------ //

#[derive(Debug, Clone)]
struct CacheEntry {
    record: WeatherRecord,
    /// Monotonic insertion time; drives expiry.
    inserted: Instant,
    /// Wall-clock insertion time; diagnostics only.
    inserted_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    /// Keys in original insertion order, oldest first.
    order: VecDeque<String>,
}

impl Inner {
    fn remove(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }
}

/// Thread-safe weather cache keyed by city name.
#[derive(Debug)]
pub struct WeatherCache {
    config: CacheConfig,
    inner: Mutex<Inner>,
}

impl WeatherCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the record for `key` if present and younger than the TTL.
    /// An expired entry is removed as a side effect.
    pub fn lookup(&self, key: &str) -> Option<WeatherRecord> {
        let now = Instant::now();
        let mut inner = self.lock();

        let expired = match inner.entries.get(key) {
            None => return None,
            Some(entry) => now.saturating_duration_since(entry.inserted) >= self.config.ttl,
        };

        if expired {
            inner.remove(key);
            debug!(city = key, "cache entry expired");
            return None;
        }

        inner.entries.get(key).map(|entry| entry.record.clone())
    }

    /// Store `record` under `key`, evicting the oldest insertion if a new key
    /// would overflow the capacity.
    pub fn insert(&self, key: impl Into<String>, record: WeatherRecord) {
        let key = key.into();
        let entry = CacheEntry {
            record,
            inserted: Instant::now(),
            inserted_at: Utc::now(),
        };
        let mut inner = self.lock();

        if let Some(existing) = inner.entries.get_mut(&key) {
            *existing = entry;
            return;
        }

        while inner.entries.len() >= self.config.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
            debug!(city = %oldest, "cache entry evicted");
        }

        inner.order.push_back(key.clone());
        inner.entries.insert(key, entry);
    }

    /// Owned copy of the current contents in insertion order, including
    /// expired entries that have not been read yet.
    pub fn snapshot(&self) -> CacheSnapshot {
        let now = Instant::now();
        let inner = self.lock();

        let entries = inner
            .order
            .iter()
            .filter_map(|key| {
                inner.entries.get(key).map(|entry| SnapshotEntry {
                    city: key.clone(),
                    record: entry.record.clone(),
                    inserted_at: entry.inserted_at,
                    age: now.saturating_duration_since(entry.inserted),
                })
            })
            .collect();

        CacheSnapshot { entries }
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ------------------------------------------------------------------ //
//  Snapshot                                                           //
// ------------------------------------------------------------------ //

#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub city: String,
    pub record: WeatherRecord,
    pub inserted_at: DateTime<Utc>,
    pub age: Duration,
}

/// Point-in-time view of a [`WeatherCache`]. Serializes as a JSON object
/// keyed by city, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub entries: Vec<SnapshotEntry>,
}

impl CacheSnapshot {
    pub fn cities(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.city.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Serialize)]
struct SnapshotValue<'a> {
    data: &'a WeatherRecord,
    /// Insertion time, unix milliseconds.
    timestamp: i64,
    inserted_at: &'a DateTime<Utc>,
    age_ms: u64,
}

impl Serialize for CacheSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            let value = SnapshotValue {
                data: &entry.record,
                timestamp: entry.inserted_at.timestamp_millis(),
                inserted_at: &entry.inserted_at,
                age_ms: u64::try_from(entry.age.as_millis()).unwrap_or(u64::MAX),
            };
            map.serialize_entry(&entry.city, &value)?;
        }
        map.end()
    }
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn record(name: &str) -> WeatherRecord {
        WeatherRecord {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn cache(capacity: usize, ttl_ms: u64) -> WeatherCache {
        WeatherCache::new(CacheConfig::new(capacity, Duration::from_millis(ttl_ms)).unwrap())
    }

    #[test]
    fn rejects_zero_capacity_and_ttl() {
        assert!(matches!(
            CacheConfig::new(0, Duration::from_secs(1)),
            Err(WeatherError::Config(_))
        ));
        assert!(matches!(
            CacheConfig::new(1, Duration::ZERO),
            Err(WeatherError::Config(_))
        ));
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = CacheConfig::default();
        assert_eq!(config.capacity(), 10);
        assert_eq!(config.ttl(), Duration::from_millis(600_000));
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_capacity_and_evicts_oldest_insertion() {
        let cache = cache(3, 60_000);
        for i in 0..10 {
            cache.insert(format!("city-{i}"), record(&format!("city-{i}")));
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.snapshot().cities(), vec!["city-7", "city-8", "city-9"]);
    }

    #[tokio::test(start_paused = true)]
    async fn reads_do_not_change_eviction_order() {
        let cache = cache(2, 60_000);
        cache.insert("A", record("A"));
        cache.insert("B", record("B"));
        assert!(cache.lookup("A").is_some());

        cache.insert("C", record("C"));
        assert!(cache.lookup("A").is_none());
        assert_eq!(cache.snapshot().cities(), vec!["B", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_a_key_keeps_its_position() {
        let cache = cache(2, 60_000);
        cache.insert("A", record("A"));
        cache.insert("B", record("B"));

        let mut updated = record("A");
        updated.temperature.temp = 21.5;
        cache.insert("A", updated.clone());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup("A"), Some(updated));

        cache.insert("C", record("C"));
        assert_eq!(cache.snapshot().cities(), vec!["B", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_a_key_resets_its_age() {
        let cache = cache(2, 1_000);
        cache.insert("A", record("A"));
        advance(Duration::from_millis(800)).await;
        cache.insert("A", record("A"));
        advance(Duration::from_millis(800)).await;
        assert!(cache.lookup("A").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_honours_ttl_boundary() {
        let cache = cache(2, 1_000);
        cache.insert("A", record("A"));

        advance(Duration::from_millis(999)).await;
        assert_eq!(cache.lookup("A"), Some(record("A")));

        advance(Duration::from_millis(1)).await;
        assert_eq!(cache.lookup("A"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_and_expiry_scenario() {
        let cache = cache(2, 1_000);
        cache.insert("A", record("A"));
        cache.insert("B", record("B"));
        cache.insert("C", record("C"));
        assert_eq!(cache.snapshot().cities(), vec!["B", "C"]);

        assert!(cache.lookup("A").is_none());

        advance(Duration::from_millis(500)).await;
        assert!(cache.lookup("B").is_some());

        advance(Duration::from_millis(1_000)).await;
        assert!(cache.lookup("B").is_none());
        assert_eq!(cache.snapshot().cities(), vec!["C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_slot_is_reused_without_evicting() {
        let cache = cache(2, 1_000);
        cache.insert("A", record("A"));
        advance(Duration::from_millis(600)).await;
        cache.insert("B", record("B"));
        advance(Duration::from_millis(600)).await;

        assert!(cache.lookup("A").is_none());
        cache.insert("C", record("C"));
        assert_eq!(cache.snapshot().cities(), vec!["B", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_removes_everything() {
        let cache = cache(4, 60_000);
        cache.insert("A", record("A"));
        cache.insert("B", record("B"));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.snapshot().is_empty());

        cache.insert("C", record("C"));
        assert_eq!(cache.snapshot().cities(), vec!["C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_serializes_as_ordered_object() {
        let cache = cache(4, 60_000);
        cache.insert("Oslo", record("Oslo"));
        cache.insert("Lima", record("Lima"));
        advance(Duration::from_millis(250)).await;

        let json = serde_json::to_string(&cache.snapshot()).unwrap();
        assert!(json.find("\"Oslo\"").unwrap() < json.find("\"Lima\"").unwrap());

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["Oslo"]["data"]["name"], "Oslo");
        assert_eq!(value["Lima"]["age_ms"], 250);
        assert!(value["Lima"]["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn concurrent_inserts_respect_capacity() {
        let cache = std::sync::Arc::new(cache(5, 60_000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let key = format!("t{t}-{i}");
                        cache.insert(key.clone(), record(&key));
                        let _ = cache.lookup(&key);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.snapshot().len(), 5);
    }
}
