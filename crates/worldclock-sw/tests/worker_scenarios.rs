//! End-to-end scenarios for the service worker against an in-memory cache
//! and a scripted network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use http::header::{CONTENT_TYPE, DATE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use url::Url;
use worldclock_sw::{
    CacheEntry, CacheKey, CacheStore, Client, ClientMessage, ControlReply, Destination,
    EventOutcome, Fetcher, MemoryCacheStorage, Request, Response, ResponseSource,
    ServiceWorker, ServiceWorkerEvent, ServiceWorkerState, SwError, SwResult, WorkerConfig,
    WorkerEvent,
};

// ==================== Scripted network ====================

#[derive(Default)]
struct MockFetcher {
    online: AtomicBool,
    calls: AtomicUsize,
    routes: Mutex<HashMap<String, Response>>,
}

impl MockFetcher {
    fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            ..Default::default()
        }
    }

    fn route(&self, url: &str, response: Response) {
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> SwResult<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) {
            return Err(SwError::NetworkUnavailable(request.url.to_string()));
        }
        let routes = self.routes.lock().unwrap();
        Ok(routes.get(request.url.as_str()).cloned().unwrap_or_else(|| {
            Response::new(StatusCode::NOT_FOUND, HeaderMap::new(), Bytes::new())
        }))
    }
}

// ==================== Harness ====================

struct Harness {
    worker: ServiceWorker,
    store: Arc<MemoryCacheStorage>,
    fetcher: Arc<MockFetcher>,
    events: mpsc::UnboundedReceiver<ServiceWorkerEvent>,
}

fn config() -> WorkerConfig {
    WorkerConfig {
        origin: Url::parse("https://clock.example.com/").unwrap(),
        time_zone: "Asia/Tokyo".to_string(),
        ..Default::default()
    }
}

fn url(path: &str) -> Url {
    config().resolve(path).unwrap()
}

fn harness_with(config: WorkerConfig, store: Arc<MemoryCacheStorage>) -> Harness {
    let fetcher = Arc::new(MockFetcher::new());
    for manifest_url in config.manifest_urls().unwrap() {
        fetcher.route(
            manifest_url.as_str(),
            Response::ok_with("text/plain", format!("asset:{manifest_url}")),
        );
    }
    let (worker, events) = ServiceWorker::new(config, store.clone(), fetcher.clone()).unwrap();
    Harness {
        worker,
        store,
        fetcher,
        events,
    }
}

fn harness() -> Harness {
    harness_with(config(), Arc::new(MemoryCacheStorage::new()))
}

async fn started() -> Harness {
    let h = harness();
    h.worker.start().await.unwrap();
    h
}

fn dated(body: &str, age: ChronoDuration) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let date = (Utc::now() - age).format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    headers.insert(DATE, HeaderValue::from_str(&date).unwrap());
    Response::new(StatusCode::OK, headers, body.to_string())
}

async fn send(worker: &ServiceWorker, data: serde_json::Value) -> Option<ControlReply> {
    let (tx, rx) = oneshot::channel();
    worker
        .handle(WorkerEvent::Message {
            data,
            reply: Some(tx),
        })
        .await
        .unwrap();
    rx.await.ok()
}

async fn fetch(worker: &ServiceWorker, request: Request) -> SwResult<Response> {
    match worker.handle(WorkerEvent::Fetch(request)).await? {
        EventOutcome::Response(response) => Ok(response),
        other => panic!("expected a response, got {other:?}"),
    }
}

// ==================== Lifecycle ====================

#[tokio::test]
async fn install_populates_static_and_offline_entry() {
    let h = harness();
    h.worker.handle(WorkerEvent::Install).await.unwrap();

    assert_eq!(h.worker.state().await, ServiceWorkerState::Installed);

    let names = h.worker.cache_names().clone();
    for manifest_url in config().manifest_urls().unwrap() {
        let hit = h
            .store
            .match_in(&names.static_cache, &CacheKey::get(&manifest_url))
            .await
            .unwrap();
        assert!(hit.is_some(), "missing {manifest_url}");
    }

    let dynamic = h.store.entry_keys(&names.dynamic_cache).await.unwrap();
    assert_eq!(dynamic, vec![h.worker.offline_key().clone()]);
}

#[tokio::test]
async fn install_is_all_or_nothing() {
    let h = harness();
    h.fetcher.route(
        url("/styles.css").as_str(),
        Response::new(StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new(), Bytes::new()),
    );

    let err = h.worker.start().await.unwrap_err();
    assert!(matches!(err, SwError::InstallFailed(_)));
    assert_eq!(h.worker.state().await, ServiceWorkerState::Redundant);
    assert_eq!(h.store.len(&h.worker.cache_names().static_cache).await, 0);
}

#[tokio::test]
async fn install_fails_offline() {
    let h = harness();
    h.fetcher.set_online(false);
    assert!(h.worker.handle(WorkerEvent::Install).await.is_err());
    assert_eq!(h.worker.state().await, ServiceWorkerState::Redundant);
    assert!(h.worker.handle(WorkerEvent::Activate).await.is_err());
}

#[tokio::test]
async fn activate_deletes_stale_caches() {
    let store = Arc::new(MemoryCacheStorage::new());
    let names = config().cache_names();
    for name in [
        names.static_cache.as_str(),
        names.dynamic_cache.as_str(),
        "world-clock-static-v0.9.0",
        "world-clock-dynamic-v0.9.0",
    ] {
        store.open(name).await.unwrap();
    }

    let h = harness_with(config(), store);
    h.worker.start().await.unwrap();

    assert_eq!(h.worker.state().await, ServiceWorkerState::Activated);
    let mut remaining = h.store.keys().await.unwrap();
    remaining.sort();
    let mut expected = vec![names.dynamic_cache, names.static_cache];
    expected.sort();
    assert_eq!(remaining, expected);
}

#[tokio::test]
async fn activate_claims_clients_and_announces_version() {
    let h = harness();
    let (client, mut inbox) = Client::window(url("/"));
    let client_id = client.id.clone();
    h.worker.add_client(client).await;

    h.worker.start().await.unwrap();

    assert!(h.worker.with_clients(|c| c.get(&client_id).unwrap().controlled).await);
    assert_eq!(
        inbox.try_recv().unwrap(),
        ClientMessage::SwUpdated {
            version: "1.0.0".to_string()
        }
    );
}

#[tokio::test]
async fn activation_reseeds_missing_offline_page() {
    let h = harness();
    h.worker.install().await.unwrap();
    let names = h.worker.cache_names().clone();
    h.store
        .delete_entry(&names.dynamic_cache, h.worker.offline_key())
        .await
        .unwrap();

    h.worker.activate().await.unwrap();

    let page = h
        .store
        .match_in(&names.dynamic_cache, h.worker.offline_key())
        .await
        .unwrap();
    assert!(page.unwrap().text().contains("You're Offline"));
}

#[tokio::test]
async fn state_changes_are_reported() {
    let mut h = started().await;
    let mut states = Vec::new();
    while let Ok(ServiceWorkerEvent::StateChange { new_state, .. }) = h.events.try_recv() {
        states.push(new_state);
    }
    assert_eq!(
        states,
        vec![
            ServiceWorkerState::Installing,
            ServiceWorkerState::Installed,
            ServiceWorkerState::Activating,
            ServiceWorkerState::Activated,
        ]
    );
}

// ==================== Fetch strategies ====================

#[tokio::test]
async fn document_offline_without_cache_gets_offline_page() {
    let h = started().await;
    h.fetcher.set_online(false);

    let response = fetch(&h.worker, Request::navigate(url("/modern.html")))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type(), Some("text/html"));
    assert!(response.text().contains("You're Offline"));
}

#[tokio::test]
async fn document_offline_page_survives_cleared_cache() {
    let h = started().await;
    h.store.delete(&h.worker.cache_names().dynamic_cache).await.unwrap();
    h.fetcher.set_online(false);

    let response = fetch(&h.worker, Request::navigate(url("/modern.html")))
        .await
        .unwrap();
    assert_eq!(response.source, ResponseSource::Worker);
    assert!(response.text().contains("You're Offline"));
}

#[tokio::test]
async fn document_is_cached_then_served_offline() {
    let h = started().await;
    h.fetcher
        .route(url("/simple.html").as_str(), Response::ok_with("text/html", "<h1>simple</h1>"));

    let live = fetch(&h.worker, Request::navigate(url("/simple.html")))
        .await
        .unwrap();
    assert_eq!(live.source, ResponseSource::Network);
    h.worker.settle().await;

    h.fetcher.set_online(false);
    let cached = fetch(&h.worker, Request::navigate(url("/simple.html")))
        .await
        .unwrap();
    assert_eq!(cached.source, ResponseSource::Cache);
    assert_eq!(cached.text(), "<h1>simple</h1>");
}

#[tokio::test]
async fn document_error_status_is_returned_but_not_cached() {
    let h = started().await;
    let response = fetch(&h.worker, Request::navigate(url("/missing.html")))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    h.worker.settle().await;

    let key = CacheKey::get(&url("/missing.html"));
    assert!(h.store.match_any(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn cached_font_is_served_without_network() {
    let h = started().await;
    let font_url = Url::parse("https://fonts.gstatic.com/s/inter/v12/inter.woff2").unwrap();
    h.store
        .put(
            &h.worker.cache_names().static_cache,
            CacheKey::get(&font_url),
            Response::ok_with("font/woff2", "woff2-bytes"),
        )
        .await
        .unwrap();
    h.fetcher.set_online(false);
    h.fetcher.reset_calls();

    let response = fetch(
        &h.worker,
        Request::get(font_url).with_destination(Destination::Font),
    )
    .await
    .unwrap();

    assert_eq!(response.text(), "woff2-bytes");
    assert_eq!(h.fetcher.calls(), 0);
}

#[tokio::test]
async fn static_asset_round_trip_through_cache_first() {
    let h = started().await;
    let script = url("/js/clock.js");
    h.fetcher
        .route(script.as_str(), Response::ok_with("text/javascript", "tick()"));
    let request = Request::get(script.clone()).with_destination(Destination::Script);

    let first = fetch(&h.worker, request.clone()).await.unwrap();
    assert_eq!(first.source, ResponseSource::Network);
    assert!(h
        .store
        .match_in(&h.worker.cache_names().static_cache, &CacheKey::get(&script))
        .await
        .unwrap()
        .is_some());

    h.fetcher.reset_calls();
    let second = fetch(&h.worker, request).await.unwrap();
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(second.body, first.body);
    assert_eq!(h.fetcher.calls(), 0);
}

#[tokio::test]
async fn static_asset_miss_offline_fails() {
    let h = started().await;
    h.fetcher.set_online(false);

    let result = fetch(
        &h.worker,
        Request::get(url("/img/flag.png")).with_destination(Destination::Image),
    )
    .await;
    assert!(matches!(result, Err(SwError::NetworkUnavailable(_))));
}

#[tokio::test]
async fn other_prefers_network_and_falls_back_to_cache() {
    let h = started().await;
    let api = url("/api/cities.json");
    h.fetcher
        .route(api.as_str(), Response::ok_with("application/json", r#"["Oslo"]"#));

    fetch(&h.worker, Request::get(api.clone())).await.unwrap();
    h.worker.settle().await;
    assert!(h
        .store
        .match_in(&h.worker.cache_names().dynamic_cache, &CacheKey::get(&api))
        .await
        .unwrap()
        .is_some());

    h.fetcher
        .route(api.as_str(), Response::ok_with("application/json", r#"["Lima"]"#));
    let fresh = fetch(&h.worker, Request::get(api.clone())).await.unwrap();
    assert_eq!(fresh.text(), r#"["Lima"]"#);
    h.worker.settle().await;

    h.fetcher.set_online(false);
    let stale = fetch(&h.worker, Request::get(api)).await.unwrap();
    assert_eq!(stale.source, ResponseSource::Cache);
    assert_eq!(stale.text(), r#"["Lima"]"#);

    let miss = fetch(&h.worker, Request::get(url("/api/unknown"))).await;
    assert!(matches!(miss, Err(SwError::NetworkUnavailable(_))));
}

#[tokio::test]
async fn uninteresting_requests_pass_through() {
    let h = harness();
    let outcome = h
        .worker
        .handle(WorkerEvent::Fetch(Request::navigate(url("/"))))
        .await
        .unwrap();
    assert!(matches!(outcome, EventOutcome::Passthrough), "inactive worker");

    h.worker.start().await.unwrap();
    h.fetcher.reset_calls();

    let cross_origin = Request::get(Url::parse("https://api.example.org/time").unwrap());
    let post = Request::get(url("/api/save")).with_method(Method::POST);
    for request in [cross_origin, post] {
        let outcome = h.worker.handle(WorkerEvent::Fetch(request)).await.unwrap();
        assert!(matches!(outcome, EventOutcome::Passthrough));
    }
    assert_eq!(h.fetcher.calls(), 0);
}

// ==================== Maintenance ====================

#[tokio::test]
async fn sweep_evicts_entries_past_retention() {
    let h = started().await;
    let dynamic = h.worker.cache_names().dynamic_cache.clone();
    let old = CacheKey::get(&url("/api/old"));
    let fresh = CacheKey::get(&url("/api/fresh"));

    for (key, age) in [(&old, 25), (&fresh, 1)] {
        h.store
            .put_entry(
                &dynamic,
                CacheEntry {
                    key: key.clone(),
                    response: dated("{}", ChronoDuration::hours(age)),
                    stored_at: None,
                },
            )
            .await;
    }

    let outcome = h
        .worker
        .handle(WorkerEvent::Sync {
            tag: "cache-cleanup".to_string(),
        })
        .await
        .unwrap();
    let EventOutcome::Swept(report) = outcome else {
        panic!("expected a sweep");
    };
    assert_eq!(report.examined, 2);
    assert_eq!(report.evicted, 1);

    assert!(h.store.match_in(&dynamic, &old).await.unwrap().is_none());
    assert!(h.store.match_in(&dynamic, &fresh).await.unwrap().is_some());
    assert!(h
        .store
        .match_in(&dynamic, h.worker.offline_key())
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn sweep_is_idempotent() {
    let h = started().await;
    let dynamic = h.worker.cache_names().dynamic_cache.clone();
    h.store
        .put_entry(
            &dynamic,
            CacheEntry {
                key: CacheKey::get(&url("/api/old")),
                response: Response::ok_with("text/plain", "x"),
                stored_at: Some(Utc::now() - ChronoDuration::hours(30)),
            },
        )
        .await;

    let first = h.worker.sweep().await.unwrap();
    let after_first = h.store.entry_keys(&dynamic).await.unwrap();
    let second = h.worker.sweep().await.unwrap();
    let after_second = h.store.entry_keys(&dynamic).await.unwrap();

    assert_eq!(first.evicted, 1);
    assert_eq!(second.evicted, 0);
    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn sweep_evicts_untimestamped_entries_but_keeps_offline_page() {
    let h = started().await;
    let dynamic = h.worker.cache_names().dynamic_cache.clone();
    let undated = CacheKey::get(&url("/api/undated"));
    h.store
        .put_entry(
            &dynamic,
            CacheEntry {
                key: undated.clone(),
                response: Response::ok_with("text/plain", "?"),
                stored_at: None,
            },
        )
        .await;
    h.store
        .put_entry(
            &dynamic,
            CacheEntry {
                key: h.worker.offline_key().clone(),
                response: worldclock_sw::offline::offline_response(),
                stored_at: Some(Utc::now() - ChronoDuration::days(3)),
            },
        )
        .await;

    let outcome = h
        .worker
        .handle(WorkerEvent::PeriodicSync {
            tag: "cache-maintenance".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, EventOutcome::Swept(r) if r.evicted == 1));

    assert!(h.store.match_in(&dynamic, &undated).await.unwrap().is_none());
    assert!(h
        .store
        .match_in(&dynamic, h.worker.offline_key())
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn sweep_leaves_static_cache_alone() {
    let h = started().await;
    let static_cache = h.worker.cache_names().static_cache.clone();
    h.store
        .put_entry(
            &static_cache,
            CacheEntry {
                key: CacheKey::get(&url("/ancient.css")),
                response: Response::ok_with("text/css", ""),
                stored_at: Some(Utc::now() - ChronoDuration::days(30)),
            },
        )
        .await;
    let before = h.store.len(&static_cache).await;

    h.worker.sweep().await.unwrap();
    assert_eq!(h.store.len(&static_cache).await, before);
}

// ==================== Control channel ====================

#[tokio::test]
async fn cache_size_sums_every_body() {
    let h = harness();
    h.store
        .put("a", CacheKey::get(&url("/a")), Response::ok_with("text/plain", vec![b'a'; 100]))
        .await
        .unwrap();
    h.store
        .put("b", CacheKey::get(&url("/b")), Response::ok_with("text/plain", vec![b'b'; 250]))
        .await
        .unwrap();

    let reply = send(&h.worker, json!({ "type": "GET_CACHE_SIZE" })).await;
    assert_eq!(reply, Some(ControlReply::CacheSize { cache_size: 350 }));
    assert_eq!(
        serde_json::to_value(reply.unwrap()).unwrap(),
        json!({ "cacheSize": 350 })
    );
}

#[tokio::test]
async fn get_version_reports_features() {
    let h = harness();
    let reply = send(&h.worker, json!({ "type": "GET_VERSION" })).await;
    let Some(ControlReply::Version { version, features }) = reply else {
        panic!("expected a version reply, got {reply:?}");
    };
    assert_eq!(version, "1.0.0");
    assert!(features.contains(&"offline-support".to_string()));
}

#[tokio::test]
async fn clear_cache_deletes_everything() {
    let h = started().await;
    assert!(!h.store.keys().await.unwrap().is_empty());

    let reply = send(&h.worker, json!({ "type": "CLEAR_CACHE" })).await;
    assert_eq!(reply, Some(ControlReply::Cleared { success: true }));
    assert!(h.store.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_message_gets_no_reply() {
    let h = harness();
    assert_eq!(send(&h.worker, json!({ "type": "SET_ALARM" })).await, None);
    assert_eq!(send(&h.worker, json!(42)).await, None);
}

#[tokio::test]
async fn skip_waiting_activates_installed_worker() {
    let h = harness();
    h.worker.install().await.unwrap();
    assert_eq!(h.worker.state().await, ServiceWorkerState::Installed);

    let reply = send(&h.worker, json!({ "type": "SKIP_WAITING" })).await;
    assert_eq!(reply, None);
    assert_eq!(h.worker.state().await, ServiceWorkerState::Activated);

    // Already active: nothing to do.
    send(&h.worker, json!({ "type": "SKIP_WAITING" })).await;
    assert_eq!(h.worker.state().await, ServiceWorkerState::Activated);
}

#[tokio::test]
async fn time_sync_announces_network() {
    let h = started().await;
    let (client, mut inbox) = Client::window(url("/"));
    h.worker.add_client(client).await;

    for event in [
        WorkerEvent::Sync {
            tag: "time-sync".to_string(),
        },
        WorkerEvent::PeriodicSync {
            tag: "time-update".to_string(),
        },
    ] {
        h.worker.handle(event).await.unwrap();
        match inbox.try_recv().unwrap() {
            ClientMessage::NetworkAvailable {
                timestamp,
                time_zone,
            } => {
                assert_eq!(time_zone, "Asia/Tokyo");
                assert!(timestamp > 0);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    let outcome = h
        .worker
        .handle(WorkerEvent::Sync {
            tag: "unknown".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, EventOutcome::Done));
    assert!(inbox.try_recv().is_err());
}

// ==================== Notifications ====================

#[tokio::test]
async fn push_shows_notification() {
    let mut h = harness();
    h.worker
        .handle(WorkerEvent::Push {
            payload: Some("Sunrise in Reykjavik".to_string()),
        })
        .await
        .unwrap();

    match h.events.try_recv().unwrap() {
        ServiceWorkerEvent::ShowNotification(n) => {
            assert_eq!(n.title, "World Clock");
            assert_eq!(n.body, "Sunrise in Reykjavik");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn notification_click_opens_or_focuses_window() {
    let mut h = harness();
    h.worker
        .handle(WorkerEvent::NotificationClick {
            action: Some("view".to_string()),
        })
        .await
        .unwrap();
    let opened_id = match h.events.try_recv().unwrap() {
        ServiceWorkerEvent::OpenWindow { client_id, url: opened } => {
            assert_eq!(opened.as_str(), "https://clock.example.com/");
            client_id
        }
        other => panic!("unexpected event {other:?}"),
    };

    h.worker
        .handle(WorkerEvent::NotificationClick { action: None })
        .await
        .unwrap();
    match h.events.try_recv().unwrap() {
        ServiceWorkerEvent::ClientFocused { client_id } => assert_eq!(client_id, opened_id),
        other => panic!("unexpected event {other:?}"),
    }
}

// ==================== Store faults ====================

/// Memory store that can refuse deletes or hold writes until released.
struct FaultyStore {
    inner: MemoryCacheStorage,
    refuse_entry_delete: Mutex<Option<String>>,
    refuse_cache_delete: AtomicBool,
    hold_puts: AtomicBool,
    put_gate: tokio::sync::Semaphore,
}

impl FaultyStore {
    fn new() -> Self {
        Self {
            inner: MemoryCacheStorage::new(),
            refuse_entry_delete: Mutex::new(None),
            refuse_cache_delete: AtomicBool::new(false),
            hold_puts: AtomicBool::new(false),
            put_gate: tokio::sync::Semaphore::new(0),
        }
    }

    fn refuse_deleting(&self, url: &Url) {
        *self.refuse_entry_delete.lock().unwrap() = Some(url.to_string());
    }

    fn release_puts(&self) {
        self.put_gate.add_permits(64);
    }
}

#[async_trait]
impl CacheStore for FaultyStore {
    async fn open(&self, name: &str) -> SwResult<()> {
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> SwResult<bool> {
        self.inner.has(name).await
    }

    async fn delete(&self, name: &str) -> SwResult<bool> {
        if self.refuse_cache_delete.load(Ordering::SeqCst) {
            return Err(SwError::Cache(format!("cannot delete {name}")));
        }
        self.inner.delete(name).await
    }

    async fn keys(&self) -> SwResult<Vec<String>> {
        self.inner.keys().await
    }

    async fn put(&self, cache: &str, key: CacheKey, response: Response) -> SwResult<()> {
        if self.hold_puts.load(Ordering::SeqCst) {
            let _permit = self
                .put_gate
                .acquire()
                .await
                .map_err(|e| SwError::Cache(e.to_string()))?;
        }
        self.inner.put(cache, key, response).await
    }

    async fn match_in(&self, cache: &str, key: &CacheKey) -> SwResult<Option<Response>> {
        self.inner.match_in(cache, key).await
    }

    async fn match_any(&self, key: &CacheKey) -> SwResult<Option<Response>> {
        self.inner.match_any(key).await
    }

    async fn delete_entry(&self, cache: &str, key: &CacheKey) -> SwResult<bool> {
        if self.refuse_entry_delete.lock().unwrap().as_deref() == Some(key.url.as_str()) {
            return Err(SwError::Cache(format!("cannot delete {key}")));
        }
        self.inner.delete_entry(cache, key).await
    }

    async fn entry_keys(&self, cache: &str) -> SwResult<Vec<CacheKey>> {
        self.inner.entry_keys(cache).await
    }

    async fn entry(&self, cache: &str, key: &CacheKey) -> SwResult<Option<CacheEntry>> {
        self.inner.entry(cache, key).await
    }
}

async fn started_over(store: Arc<FaultyStore>) -> (ServiceWorker, Arc<MockFetcher>) {
    let fetcher = Arc::new(MockFetcher::new());
    for manifest_url in config().manifest_urls().unwrap() {
        fetcher.route(manifest_url.as_str(), Response::ok_with("text/plain", "asset"));
    }
    let (worker, _events) = ServiceWorker::new(config(), store, fetcher.clone()).unwrap();
    worker.start().await.unwrap();
    (worker, fetcher)
}

#[tokio::test]
async fn sweep_isolates_a_failing_entry() {
    let store = Arc::new(FaultyStore::new());
    let (worker, _fetcher) = started_over(store.clone()).await;
    let dynamic = worker.cache_names().dynamic_cache.clone();

    for path in ["/api/a", "/api/b", "/api/c"] {
        store
            .inner
            .put_entry(
                &dynamic,
                CacheEntry {
                    key: CacheKey::get(&url(path)),
                    response: Response::ok_with("application/json", "{}"),
                    stored_at: Some(Utc::now() - ChronoDuration::hours(30)),
                },
            )
            .await;
    }
    store.refuse_deleting(&url("/api/a"));

    let report = worker.sweep().await.unwrap();
    assert_eq!(report.examined, 3);
    assert_eq!(report.evicted, 2);
    assert_eq!(report.failed, 1);

    let mut left = store.inner.entry_keys(&dynamic).await.unwrap();
    left.retain(|k| k != worker.offline_key());
    assert_eq!(left, vec![CacheKey::get(&url("/api/a"))]);
}

#[tokio::test]
async fn clear_cache_reports_store_failure() {
    let store = Arc::new(FaultyStore::new());
    let (worker, _fetcher) = started_over(store.clone()).await;
    store.refuse_cache_delete.store(true, Ordering::SeqCst);

    let reply = send(&worker, json!({ "type": "CLEAR_CACHE" })).await;
    assert_eq!(reply, Some(ControlReply::Cleared { success: false }));
    assert!(!store.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn document_is_returned_before_its_cache_write_lands() {
    let store = Arc::new(FaultyStore::new());
    let (worker, fetcher) = started_over(store.clone()).await;
    let page = url("/simple.html");
    fetcher.route(page.as_str(), Response::ok_with("text/html", "<h1>simple</h1>"));
    store.hold_puts.store(true, Ordering::SeqCst);

    let response = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        fetch(&worker, Request::navigate(page.clone())),
    )
    .await
    .expect("document response waited on the cache write")
    .unwrap();
    assert_eq!(response.text(), "<h1>simple</h1>");

    let key = CacheKey::get(&page);
    assert!(store.match_any(&key).await.unwrap().is_none());

    store.release_puts();
    worker.settle().await;
    assert!(store.match_any(&key).await.unwrap().is_some());
}

#[tokio::test]
async fn concurrent_skip_waiting_activates_once() {
    let mut h = harness();
    h.worker.install().await.unwrap();
    while h.events.try_recv().is_ok() {}

    let (first, second) = tokio::join!(
        send(&h.worker, json!({ "type": "SKIP_WAITING" })),
        send(&h.worker, json!({ "type": "SKIP_WAITING" })),
    );
    assert_eq!((first, second), (None, None));
    assert_eq!(h.worker.state().await, ServiceWorkerState::Activated);

    let mut activating = 0;
    while let Ok(event) = h.events.try_recv() {
        if let ServiceWorkerEvent::StateChange {
            new_state: ServiceWorkerState::Activating,
            ..
        } = event
        {
            activating += 1;
        }
    }
    assert_eq!(activating, 1);
}

#[tokio::test]
async fn fetch_during_settle_is_not_blocked() {
    let store = Arc::new(FaultyStore::new());
    let (worker, fetcher) = started_over(store.clone()).await;
    let first = url("/first.html");
    let second = url("/second.html");
    fetcher.route(first.as_str(), Response::ok_with("text/html", "first"));
    fetcher.route(second.as_str(), Response::ok_with("text/html", "second"));
    store.hold_puts.store(true, Ordering::SeqCst);

    fetch(&worker, Request::navigate(first.clone())).await.unwrap();

    let settling = worker.settle();
    tokio::pin!(settling);
    assert!(futures::poll!(settling.as_mut()).is_pending());

    let response = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        fetch(&worker, Request::navigate(second.clone())),
    )
    .await
    .expect("fetch blocked behind settle")
    .unwrap();
    assert_eq!(response.text(), "second");

    store.release_puts();
    settling.await;
    worker.settle().await;
    assert!(store.match_any(&CacheKey::get(&first)).await.unwrap().is_some());
    assert!(store.match_any(&CacheKey::get(&second)).await.unwrap().is_some());
}
