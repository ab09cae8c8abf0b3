//! Named request → response caches.
//!
//! ```text
//! CacheStorage (caches)
//!     └── Cache (by name, e.g. "world-clock-static-v1")
//!             └── CacheKey (method + url) → CacheEntry
//! ```
//!
//! The worker only talks to [`CacheStore`]; [`MemoryCacheStorage`] is the
//! in-process implementation used by hosts and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use http::Method;
use tokio::sync::RwLock;
use url::Url;

use crate::error::{SwError, SwResult};
use crate::request::{Request, Response, ResponseSource};

// ==================== Keys & Entries ====================

/// Identity of a cached request: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: Method,
    pub url: String,
}

impl CacheKey {
    /// Build a key, dropping any URL fragment.
    pub fn new(method: Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method,
            url: url.into(),
        }
    }

    /// Key for a GET of `url`.
    pub fn get(url: &Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Key for an intercepted request.
    pub fn for_request(request: &Request) -> Self {
        Self::new(request.method.clone(), &request.url)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A cached request/response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub response: Response,
    /// When the entry was written, if the store tracked it.
    pub stored_at: Option<DateTime<Utc>>,
}

// ==================== Store Trait ====================

/// Named caches of request → response pairs (`CacheStorage`).
///
/// Implementations must make single-key put/match/delete atomic; the worker
/// does no locking of its own.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a cache, creating it if it doesn't exist.
    async fn open(&self, name: &str) -> SwResult<()>;

    /// Check if a cache exists.
    async fn has(&self, name: &str) -> SwResult<bool>;

    /// Delete a cache and all its entries.
    async fn delete(&self, name: &str) -> SwResult<bool>;

    /// Names of all caches, in creation order.
    async fn keys(&self) -> SwResult<Vec<String>>;

    /// Store a response, creating the cache if needed. Overwrites.
    async fn put(&self, cache: &str, key: CacheKey, response: Response) -> SwResult<()>;

    /// Look up a key in one cache.
    async fn match_in(&self, cache: &str, key: &CacheKey) -> SwResult<Option<Response>>;

    /// Look up a key across all caches, oldest cache first.
    async fn match_any(&self, key: &CacheKey) -> SwResult<Option<Response>>;

    /// Delete one entry.
    async fn delete_entry(&self, cache: &str, key: &CacheKey) -> SwResult<bool>;

    /// Keys of every entry in a cache. Empty if the cache doesn't exist.
    async fn entry_keys(&self, cache: &str) -> SwResult<Vec<CacheKey>>;

    /// Full entry, including its write time.
    async fn entry(&self, cache: &str, key: &CacheKey) -> SwResult<Option<CacheEntry>>;
}

// ==================== In-memory Cache ====================

/// A single named cache.
#[derive(Debug)]
struct Cache {
    created: u64,
    entries: HashMap<CacheKey, CacheEntry>,
}

impl Cache {
    fn new(created: u64) -> Self {
        Self {
            created,
            entries: HashMap::new(),
        }
    }

    fn match_request(&self, key: &CacheKey) -> Option<Response> {
        self.entries
            .get(key)
            .map(|e| e.response.clone().with_source(ResponseSource::Cache))
    }
}

#[derive(Debug, Default)]
struct Inner {
    caches: HashMap<String, Cache>,
    next_seq: u64,
}

impl Inner {
    fn open(&mut self, name: &str) -> &mut Cache {
        let seq = self.next_seq + 1;
        let cache = self
            .caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(seq));
        if cache.created == seq {
            self.next_seq = seq;
        }
        cache
    }

    fn ordered(&self) -> Vec<(&String, &Cache)> {
        let mut caches: Vec<_> = self.caches.iter().collect();
        caches.sort_by_key(|(_, c)| c.created);
        caches
    }
}

/// In-process cache storage behind an async `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    inner: RwLock<Inner>,
}

impl MemoryCacheStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a complete entry as-is, keeping its `stored_at`.
    ///
    /// Used to import entries written by another store.
    pub async fn put_entry(&self, cache: &str, entry: CacheEntry) {
        let mut inner = self.inner.write().await;
        inner.open(cache).entries.insert(entry.key.clone(), entry);
    }

    /// Number of entries in a cache.
    pub async fn len(&self, cache: &str) -> usize {
        self.inner
            .read()
            .await
            .caches
            .get(cache)
            .map_or(0, |c| c.entries.len())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStorage {
    async fn open(&self, name: &str) -> SwResult<()> {
        self.inner.write().await.open(name);
        Ok(())
    }

    async fn has(&self, name: &str) -> SwResult<bool> {
        Ok(self.inner.read().await.caches.contains_key(name))
    }

    async fn delete(&self, name: &str) -> SwResult<bool> {
        Ok(self.inner.write().await.caches.remove(name).is_some())
    }

    async fn keys(&self) -> SwResult<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner.ordered().into_iter().map(|(n, _)| n.clone()).collect())
    }

    async fn put(&self, cache: &str, key: CacheKey, response: Response) -> SwResult<()> {
        if key.method != Method::GET {
            return Err(SwError::Cache(format!("only GET requests are cacheable: {key}")));
        }
        let entry = CacheEntry {
            key: key.clone(),
            response,
            stored_at: Some(Utc::now()),
        };
        let mut inner = self.inner.write().await;
        inner.open(cache).entries.insert(key, entry);
        Ok(())
    }

    async fn match_in(&self, cache: &str, key: &CacheKey) -> SwResult<Option<Response>> {
        let inner = self.inner.read().await;
        Ok(inner.caches.get(cache).and_then(|c| c.match_request(key)))
    }

    async fn match_any(&self, key: &CacheKey) -> SwResult<Option<Response>> {
        let inner = self.inner.read().await;
        Ok(inner
            .ordered()
            .into_iter()
            .find_map(|(_, cache)| cache.match_request(key)))
    }

    async fn delete_entry(&self, cache: &str, key: &CacheKey) -> SwResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .caches
            .get_mut(cache)
            .is_some_and(|c| c.entries.remove(key).is_some()))
    }

    async fn entry_keys(&self, cache: &str) -> SwResult<Vec<CacheKey>> {
        let inner = self.inner.read().await;
        Ok(inner
            .caches
            .get(cache)
            .map(|c| c.entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn entry(&self, cache: &str, key: &CacheKey) -> SwResult<Option<CacheEntry>> {
        let inner = self.inner.read().await;
        Ok(inner.caches.get(cache).and_then(|c| c.entries.get(key).cloned()))
    }
}
