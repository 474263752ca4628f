//! Thread-Safe Storage Engine
//!
//! The single shared mutable resource of the server: a map from key to
//! [`Entry`], accessed concurrently by every connection task.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are distributed across shards by hash. Each public operation takes
//! exactly one shard lock for exactly one map operation, so concurrent
//! `set`/`get` calls on the same key are serialized and never observe a
//! torn value. Locks are synchronous and never held across an `.await`.
//!
//! `get` refreshes the entry's access stamp, so it takes the write lock.
//! Only pure inspection (`peek`, `exists`, `len`) uses the read lock.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// Microseconds since the Unix epoch.
fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// A stored value plus its access metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The stored payload
    pub value: Bytes,
    /// Last read or write, in microseconds since the Unix epoch
    pub last_access: u64,
    /// Relative lifetime recorded at write time. Not enforced.
    pub ttl: Option<Duration>,
}

impl Entry {
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            last_access: now_micros(),
            ttl: None,
        }
    }

    pub fn with_ttl(value: Bytes, ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::new(value)
        }
    }

    /// Refreshes the access stamp.
    ///
    /// The stamp never moves backwards, even if the wall clock does, and two
    /// touches always produce distinct stamps.
    #[inline]
    pub fn touch(&mut self) {
        self.last_access = now_micros().max(self.last_access + 1);
    }

    /// Last access in whole seconds since the Unix epoch.
    pub fn last_access_secs(&self) -> u64 {
        self.last_access / 1_000_000
    }
}

/// Snapshot of the engine's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub hits: u64,
    pub misses: u64,
}

/// A single shard containing a portion of the key-value pairs.
#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Bytes, Entry>>,
}

/// The key-value store shared by every connection.
///
/// Wrap it in an `Arc` and hand a clone to each connection task.
///
/// # Example
///
/// ```
/// use emberkv::storage::StorageEngine;
/// use bytes::Bytes;
///
/// let engine = StorageEngine::new();
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"));
///
/// let entry = engine.get(b"name").unwrap();
/// assert_eq!(entry.value, Bytes::from("Ariz"));
/// assert!(engine.get(b"missing").is_none());
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,
    key_count: AtomicU64,
    get_count: AtomicU64,
    set_count: AtomicU64,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
            key_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Creates or replaces the value for `key` and refreshes its access stamp.
    ///
    /// An existing TTL is kept; use [`set_with_ttl`](Self::set_with_ttl) to
    /// replace it.
    ///
    /// # Returns
    ///
    /// `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        self.upsert(key, value, None)
    }

    /// Like [`set`](Self::set), but records `ttl` on the entry.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) -> bool {
        self.upsert(key, value, Some(ttl))
    }

    fn upsert(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.get_shard(&key).data.write();
        match data.get_mut(&key) {
            Some(entry) => {
                entry.value = value;
                if ttl.is_some() {
                    entry.ttl = ttl;
                }
                entry.touch();
                false
            }
            None => {
                let entry = match ttl {
                    Some(ttl) => Entry::with_ttl(value, ttl),
                    None => Entry::new(value),
                };
                data.insert(key, entry);
                self.key_count.fetch_add(1, Ordering::Relaxed);
                true
            }
        }
    }

    /// Looks up `key`, refreshing its access stamp.
    ///
    /// Returns a snapshot of the entry as of the refresh, or `None` if the
    /// key was never written.
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.get_shard(key).data.write();
        match data.get_mut(key) {
            Some(entry) => {
                entry.touch();
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Returns the entry for `key` without refreshing its access stamp.
    pub fn peek(&self, key: &[u8]) -> Option<Entry> {
        self.get_shard(key).data.read().get(key).cloned()
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.get_shard(key).data.read().contains_key(key)
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.data.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every key.
    pub fn clear(&self) {
        for shard in &self.shards {
            let mut data = shard.data.write();
            self.key_count.fetch_sub(data.len() as u64, Ordering::Relaxed);
            data.clear();
        }
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.key_count.load(Ordering::Relaxed),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_set_and_get() {
        let engine = StorageEngine::new();

        assert!(engine.set(Bytes::from("key"), Bytes::from("value")));
        let entry = engine.get(b"key").unwrap();
        assert_eq!(entry.value, Bytes::from("value"));
        assert_eq!(entry.ttl, None);
    }

    #[test]
    fn test_get_nonexistent() {
        let engine = StorageEngine::new();
        assert_eq!(engine.get(b"nonexistent"), None);
    }

    #[test]
    fn test_last_write_wins() {
        let engine = StorageEngine::new();

        assert!(engine.set(Bytes::from("key"), Bytes::from("v1")));
        let first = engine.peek(b"key").unwrap().last_access;

        assert!(!engine.set(Bytes::from("key"), Bytes::from("v2")));
        let second = engine.peek(b"key").unwrap();

        assert_eq!(second.value, Bytes::from("v2"));
        assert!(second.last_access > first);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_get_refreshes_last_access() {
        let engine = StorageEngine::new();
        engine.set(Bytes::from("key"), Bytes::from("value"));

        let before = engine.peek(b"key").unwrap().last_access;
        let read = engine.get(b"key").unwrap().last_access;
        assert!(read > before);

        // peek is read-only
        assert_eq!(engine.peek(b"key").unwrap().last_access, read);
    }

    #[test]
    fn test_last_access_secs() {
        let engine = StorageEngine::new();
        engine.set(Bytes::from("key"), Bytes::from("value"));

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let secs = engine.peek(b"key").unwrap().last_access_secs();
        assert!(secs <= now && now - secs < 5);
    }

    #[test]
    fn test_set_keeps_ttl() {
        let engine = StorageEngine::new();

        engine.set_with_ttl(
            Bytes::from("session"),
            Bytes::from("a"),
            Duration::from_secs(60),
        );
        engine.set(Bytes::from("session"), Bytes::from("b"));

        let entry = engine.peek(b"session").unwrap();
        assert_eq!(entry.value, Bytes::from("b"));
        assert_eq!(entry.ttl, Some(Duration::from_secs(60)));

        engine.set_with_ttl(
            Bytes::from("session"),
            Bytes::from("c"),
            Duration::from_secs(5),
        );
        assert_eq!(
            engine.peek(b"session").unwrap().ttl,
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_ttl_is_not_enforced() {
        let engine = StorageEngine::new();
        engine.set_with_ttl(Bytes::from("k"), Bytes::from("v"), Duration::from_millis(1));

        thread::sleep(Duration::from_millis(20));
        assert_eq!(engine.get(b"k").unwrap().value, Bytes::from("v"));
    }

    #[test]
    fn test_exists_len_clear() {
        let engine = StorageEngine::new();
        assert!(engine.is_empty());

        for i in 0..100 {
            engine.set(Bytes::from(format!("key:{}", i)), Bytes::from("v"));
        }
        assert!(engine.exists(b"key:42"));
        assert!(!engine.exists(b"key:100"));
        assert_eq!(engine.len(), 100);

        engine.clear();
        assert!(engine.is_empty());
        assert_eq!(engine.stats().keys, 0);
    }

    #[test]
    fn test_stats() {
        let engine = StorageEngine::new();
        engine.set(Bytes::from("a"), Bytes::from("1"));
        engine.set(Bytes::from("a"), Bytes::from("2"));
        engine.get(b"a");
        engine.get(b"b");

        let stats = engine.stats();
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.set_ops, 2);
        assert_eq!(stats.get_ops, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_concurrent_disjoint_keys() {
        let engine = Arc::new(StorageEngine::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for i in 0..1_000 {
                        let key = Bytes::from(format!("key:{}:{}", t, i));
                        engine.set(key.clone(), Bytes::from(format!("value:{}:{}", t, i)));
                        assert!(engine.get(&key).is_some());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 8_000);
        assert_eq!(engine.stats().keys, 8_000);
        for t in 0..8 {
            for i in (0..1_000).step_by(97) {
                let entry = engine.peek(format!("key:{}:{}", t, i).as_bytes()).unwrap();
                assert_eq!(entry.value, Bytes::from(format!("value:{}:{}", t, i)));
            }
        }
    }

    #[test]
    fn test_concurrent_same_key_never_torn() {
        let engine = Arc::new(StorageEngine::new());
        // Each writer uses a distinct byte repeated, so a blend is detectable
        let values: Vec<Bytes> = (0..8u8)
            .map(|t| Bytes::from(vec![b'a' + t; 4096]))
            .collect();

        let handles: Vec<_> = values
            .iter()
            .cloned()
            .map(|value| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for _ in 0..500 {
                        engine.set(Bytes::from("shared"), value.clone());
                        let seen = engine.get(b"shared").unwrap().value;
                        assert!(seen.iter().all(|b| *b == seen[0]));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let last = engine.get(b"shared").unwrap().value;
        assert!(values.contains(&last));
        assert_eq!(engine.len(), 1);
    }
}
