//! Fetch strategies.
//!
//! | Class         | Strategy                                   | Writes to |
//! |---------------|--------------------------------------------|-----------|
//! | `Document`    | network first, cache, then offline page    | dynamic   |
//! | `Font`        | cache first                                | static    |
//! | `StaticAsset` | cache first                                | static    |
//! | `Other`       | network first, then cache                  | dynamic   |

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheStore};
use crate::classify::ResourceClass;
use crate::config::CacheNames;
use crate::error::SwResult;
use crate::fetch::Fetcher;
use crate::offline::offline_response;
use crate::request::{Request, Response};

/// A fixed ordering of network and cache lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Network, then any cache, then the offline page. Never fails.
    NetworkFirstOffline,
    /// Any cache, then network (stored in the static cache).
    CacheFirst,
    /// Network (stored in the dynamic cache), then any cache.
    NetworkFirst,
}

impl Strategy {
    /// Strategy used for a resource class.
    pub fn for_class(class: ResourceClass) -> Self {
        match class {
            ResourceClass::Document => Strategy::NetworkFirstOffline,
            ResourceClass::Font | ResourceClass::StaticAsset => Strategy::CacheFirst,
            ResourceClass::Other => Strategy::NetworkFirst,
        }
    }
}

/// Cache writes that run after the response has been handed back.
#[derive(Default)]
pub(crate) struct BackgroundWrites {
    tasks: Mutex<JoinSet<()>>,
}

impl BackgroundWrites {
    async fn spawn_put(
        &self,
        store: Arc<dyn CacheStore>,
        cache: String,
        key: CacheKey,
        response: Response,
    ) {
        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            if let Err(e) = store.put(&cache, key.clone(), response).await {
                warn!(%key, %cache, error = %e, "Background cache write failed");
            }
        });
    }

    /// Wait for every pending write.
    ///
    /// The set is swapped out first so new writes can be queued meanwhile.
    pub(crate) async fn settle(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Background cache write panicked");
            }
        }
    }
}

/// Runs strategies against the cache store and the network.
pub struct StrategyEngine {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    names: CacheNames,
    offline_key: CacheKey,
    writes: BackgroundWrites,
}

impl StrategyEngine {
    /// Create a new engine.
    pub fn new(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
        names: CacheNames,
        offline_key: CacheKey,
    ) -> Self {
        Self {
            store,
            fetcher,
            names,
            offline_key,
            writes: BackgroundWrites::default(),
        }
    }

    /// Answer a classified request.
    pub async fn handle(&self, class: ResourceClass, request: &Request) -> SwResult<Response> {
        let strategy = Strategy::for_class(class);
        debug!(url = %request.url, ?class, ?strategy, "Handling fetch");

        match strategy {
            Strategy::NetworkFirstOffline => Ok(self.network_first_offline(request).await),
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
        }
    }

    /// Wait for background cache writes to finish.
    pub async fn settle(&self) {
        self.writes.settle().await;
    }

    async fn network_first_offline(&self, request: &Request) -> Response {
        let key = CacheKey::for_request(request);
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    self.store_later(&self.names.dynamic_cache, key, &response).await;
                }
                response
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Document fetch failed, trying cache");
                if let Some(cached) = self.lookup(&key).await {
                    return cached;
                }
                self.offline_page().await
            }
        }
    }

    async fn cache_first(&self, request: &Request) -> SwResult<Response> {
        let key = CacheKey::for_request(request);
        if let Some(cached) = self.lookup(&key).await {
            debug!(%key, "Cache hit");
            return Ok(cached);
        }

        let response = self.fetcher.fetch(request).await?;
        if response.ok() {
            if let Err(e) = self
                .store
                .put(&self.names.static_cache, key.clone(), response.clone())
                .await
            {
                warn!(%key, error = %e, "Failed to cache static asset");
            }
        }
        Ok(response)
    }

    async fn network_first(&self, request: &Request) -> SwResult<Response> {
        let key = CacheKey::for_request(request);
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    self.store_later(&self.names.dynamic_cache, key, &response).await;
                }
                Ok(response)
            }
            Err(e) => match self.lookup(&key).await {
                Some(cached) => {
                    debug!(%key, "Network failed, served from cache");
                    Ok(cached)
                }
                None => Err(e),
            },
        }
    }

    /// Stored offline page, or a freshly built one if it went missing.
    pub async fn offline_page(&self) -> Response {
        match self
            .store
            .match_in(&self.names.dynamic_cache, &self.offline_key)
            .await
        {
            Ok(Some(page)) => page,
            Ok(None) => {
                warn!("Offline page missing from cache, synthesizing it");
                offline_response()
            }
            Err(e) => {
                warn!(error = %e, "Offline page lookup failed, synthesizing it");
                offline_response()
            }
        }
    }

    async fn lookup(&self, key: &CacheKey) -> Option<Response> {
        match self.store.match_any(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(%key, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    async fn store_later(&self, cache: &str, key: CacheKey, response: &Response) {
        self.writes
            .spawn_put(Arc::clone(&self.store), cache.to_string(), key, response.clone())
            .await;
    }
}
