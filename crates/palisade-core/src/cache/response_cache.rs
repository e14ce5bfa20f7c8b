//! Response cache: TTL + LRU eviction with single-flight
//! computation so concurrent requests for the same key only hit the backend
//! once.

use crate::models::cache::CachedResponse;
use crate::models::config::CacheConfig;
use ahash::HashMap as AHashMap;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Default storage eligibility: only a clean 200 is worth caching. Combined
/// with the dispatcher's own method check (`GET` only), this is the
/// `method == GET && status == 200` predicate.
pub fn is_cacheable_status(status: u16) -> bool {
    status == 200
}

/// Builds the cache key: a SHA-256 digest over method, URL, and the
/// configured vary-header values, so two requests differing only in an
/// unrelated header still collide.
pub fn cache_key(method: &str, url: &str, vary_headers: &[(String, String)]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\0");
    hasher.update(url.as_bytes());
    let mut sorted = vary_headers.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, value) in sorted {
        hasher.update(b"\0");
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// A TTL-expiring, capacity-bounded cache of upstream responses. Bounded to
/// `config.capacity` entries; the least-recently-accessed entry is evicted
/// when a new one would exceed capacity.
pub struct ResponseCache {
    config: CacheConfig,
    store: RwLock<AHashMap<String, CachedResponse>>,
    inflight: Mutex<AHashMap<String, Arc<Mutex<()>>>>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            store: RwLock::new(AHashMap::default()),
            inflight: Mutex::new(AHashMap::default()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn vary_headers(&self) -> &[String] {
        &self.config.vary_headers
    }

    /// Looks up `key`, returning a fresh clone and marking it accessed, or
    /// `None` on a miss or expired entry. Expired entries are left for the
    /// sweeper to reclaim rather than removed inline, keeping the read path
    /// lock-light.
    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        let now = Instant::now();
        let mut store = self.store.write().await;
        match store.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.touch(now);
                Some(entry.clone())
            }
            _ => None,
        }
    }

    /// Returns the cached value for `key` if present and fresh; otherwise
    /// runs `compute` exactly once across all concurrent callers for that
    /// key (single-flight) and caches its result.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: String,
        compute: F,
    ) -> Result<CachedResponse, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedResponse, E>>,
    {
        if let Some(hit) = self.get(&key).await {
            return Ok(hit);
        }

        let slot = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = slot.lock().await;

        if let Some(hit) = self.get(&key).await {
            self.inflight.lock().await.remove(&key);
            return Ok(hit);
        }

        let result = compute().await;
        if let Ok(value) = &result {
            if is_cacheable_status(value.status) {
                self.insert(key.clone(), value.clone()).await;
            }
        }
        self.inflight.lock().await.remove(&key);
        result
    }

    pub async fn insert(&self, key: String, value: CachedResponse) {
        let mut store = self.store.write().await;
        if store.len() >= self.config.capacity && !store.contains_key(&key) {
            if let Some(lru_key) = store
                .iter()
                .min_by_key(|(_, v)| v.last_accessed)
                .map(|(k, _)| k.clone())
            {
                store.remove(&lru_key);
            }
        }
        store.insert(key, value);
    }

    /// Removes every expired entry. Run periodically by a background
    /// sweeper task; also safe to call directly from tests.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut store = self.store.write().await;
        let before = store.len();
        store.retain(|_, v| !v.is_expired(now));
        before - store.len()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.config.sweep_interval_ms)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.config.ttl_ms)
    }
}

/// Spawns a background task that calls [`ResponseCache::sweep`] on the
/// configured interval until the returned handle is dropped or aborted.
pub fn spawn_sweeper(cache: Arc<ResponseCache>) -> tokio::task::JoinHandle<()> {
    let interval = cache.sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let evicted = cache.sweep().await;
            if evicted > 0 {
                log::debug!("cache sweep evicted {evicted} expired entries");
            }
        }
    })
}
