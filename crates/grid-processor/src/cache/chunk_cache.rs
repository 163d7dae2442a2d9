//! LRU cache for decompressed field chunks.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use serde::Serialize;
use tokio::sync::{Mutex, OnceCell, RwLock};

use crate::config::GridProcessorConfig;
use crate::error::Result;

/// Cache key for chunks: store hash, field index and chunk coordinates `[t, y, x]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub store: u64,
    pub field: u32,
    pub chunk: [u64; 3],
}

impl ChunkKey {
    pub fn new(store: u64, field: u32, chunk: [u64; 3]) -> Self {
        Self {
            store,
            field,
            chunk,
        }
    }
}

/// A decompressed chunk, trimmed to the array edge.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPayload {
    /// Actual shape `[t, y, x]` of the data.
    pub shape: [usize; 3],
    /// Row-major values.
    pub data: Vec<f32>,
}

impl ChunkPayload {
    pub fn new(shape: [usize; 3], data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    /// Value at a position local to the chunk.
    pub fn get(&self, t: usize, y: usize, x: usize) -> Option<f32> {
        let [nt, ny, nx] = self.shape;
        if t >= nt || y >= ny || x >= nx {
            return None;
        }
        self.data.get((t * ny + y) * nx + x).copied()
    }

    /// Heap size of the payload in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Loader invocations that produced a payload.
    pub loads: u64,
    pub evictions: u64,
    pub entries: usize,
    pub memory_bytes: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entries {
    cache: LruCache<ChunkKey, Arc<ChunkPayload>>,
    memory_limit: usize,
    current_memory: usize,
}

impl Entries {
    /// Insert a payload, returning how many entries were evicted.
    fn insert(&mut self, key: ChunkKey, payload: Arc<ChunkPayload>) -> u64 {
        let data_size = payload.size_bytes();

        // Never cache a payload larger than the whole budget
        if data_size > self.memory_limit {
            return 0;
        }

        if let Some(previous) = self.cache.pop(&key) {
            self.current_memory = self.current_memory.saturating_sub(previous.size_bytes());
        }

        let mut evicted = 0;
        while self.current_memory + data_size > self.memory_limit {
            match self.cache.pop_lru() {
                Some((_, old)) => {
                    self.current_memory = self.current_memory.saturating_sub(old.size_bytes());
                    evicted += 1;
                }
                None => break,
            }
        }

        // Entry-count ceiling
        if let Some((_, old)) = self.cache.push(key, payload) {
            self.current_memory = self.current_memory.saturating_sub(old.size_bytes());
            evicted += 1;
        }
        self.current_memory += data_size;

        evicted
    }

    fn evict_to_target(&mut self, target_bytes: usize) -> u64 {
        let mut evicted = 0;
        while self.current_memory > target_bytes {
            match self.cache.pop_lru() {
                Some((_, old)) => {
                    self.current_memory = self.current_memory.saturating_sub(old.size_bytes());
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }
}

type InFlight = Arc<OnceCell<Arc<ChunkPayload>>>;

/// Shared chunk cache with memory-bounded LRU eviction and single-flight loads.
///
/// Lookups that hit only take a read lock. Concurrent misses on the same key
/// wait on one load; misses on different keys load in parallel. A failed load
/// leaves nothing behind: only its caller sees the error, and the next waiter
/// on that key runs its own loader.
pub struct ChunkCache {
    entries: RwLock<Entries>,
    in_flight: Mutex<HashMap<ChunkKey, InFlight>>,
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    evictions: AtomicU64,
}

impl ChunkCache {
    /// Create a cache bounded by `memory_limit` bytes and `max_entries` chunks.
    pub fn new(memory_limit: usize, max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);

        Self {
            entries: RwLock::new(Entries {
                cache: LruCache::new(capacity),
                memory_limit,
                current_memory: 0,
            }),
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Create a cache sized from the processor configuration.
    pub fn from_config(config: &GridProcessorConfig) -> Self {
        Self::new(
            config.chunk_cache_size_bytes(),
            config.chunk_cache_max_entries,
        )
    }

    /// Return the cached payload for `key`, or run `loader` to produce it.
    pub async fn get_or_load<F, Fut>(&self, key: ChunkKey, loader: F) -> Result<Arc<ChunkPayload>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ChunkPayload>>,
    {
        if let Some(payload) = self.lookup(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(payload);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let cell = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(key)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_try_init(|| async move {
                // A load for this key may have completed since the lookup
                if let Some(payload) = self.peek(&key).await {
                    return Ok(payload);
                }

                let payload = Arc::new(loader().await?);
                self.loads.fetch_add(1, Ordering::Relaxed);

                let evicted = self.entries.write().await.insert(key, payload.clone());
                self.evictions.fetch_add(evicted, Ordering::Relaxed);

                Ok(payload)
            })
            .await
            .map(Arc::clone);

        {
            let mut in_flight = self.in_flight.lock().await;
            if in_flight
                .get(&key)
                .is_some_and(|current| Arc::ptr_eq(current, &cell))
            {
                in_flight.remove(&key);
            }
        }

        result
    }

    /// Look up a key, promoting it when the write lock is free.
    async fn lookup(&self, key: &ChunkKey) -> Option<Arc<ChunkPayload>> {
        let found = self.peek(key).await;
        if found.is_some() {
            if let Ok(mut entries) = self.entries.try_write() {
                entries.cache.promote(key);
            }
        }
        found
    }

    async fn peek(&self, key: &ChunkKey) -> Option<Arc<ChunkPayload>> {
        self.entries.read().await.cache.peek(key).cloned()
    }

    /// Check if a key exists in the cache without updating LRU order.
    pub async fn contains(&self, key: &ChunkKey) -> bool {
        self.entries.read().await.cache.contains(key)
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: entries.cache.len(),
            memory_bytes: entries.current_memory as u64,
        }
    }

    /// Clear all entries from the cache.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.cache.clear();
        entries.current_memory = 0;
    }

    /// Evict entries to reach target memory usage.
    ///
    /// Returns the number of entries evicted.
    pub async fn evict_to_target(&self, target_bytes: usize) -> usize {
        let evicted = self.entries.write().await.evict_to_target(target_bytes);
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
        evicted as usize
    }

    /// Get the current memory usage in bytes.
    pub async fn memory_usage(&self) -> usize {
        self.entries.read().await.current_memory
    }

    /// Get the memory limit in bytes.
    pub async fn memory_limit(&self) -> usize {
        self.entries.read().await.memory_limit
    }

    /// Get the number of entries in the cache.
    pub async fn len(&self) -> usize {
        self.entries.read().await.cache.len()
    }

    /// Check if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.cache.is_empty()
    }
}

/// Hash a store location for use in cache keys.
pub fn hash_path(path: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}
