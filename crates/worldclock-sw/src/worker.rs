//! The service worker: one object that receives every event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::cache::{CacheKey, CacheStore};
use crate::classify::classify;
use crate::clients::{Client, Clients};
use crate::config::{CacheNames, WorkerConfig};
use crate::control::{self, ClientMessage, ControlReply, ControlRequest};
use crate::error::{SwError, SwResult};
use crate::fetch::Fetcher;
use crate::lifecycle::{Lifecycle, ServiceWorkerState};
use crate::maintenance::{CacheMaintenance, SweepReport};
use crate::notification::Notification;
use crate::offline::offline_response;
use crate::request::{Request, Response};
use crate::strategy::StrategyEngine;

/// One-shot background sync tags.
pub const SYNC_TIME: &str = "time-sync";
pub const SYNC_CACHE_CLEANUP: &str = "cache-cleanup";

/// Periodic sync tags.
pub const PERIODIC_TIME_UPDATE: &str = "time-update";
pub const PERIODIC_CACHE_MAINTENANCE: &str = "cache-maintenance";

// ==================== Events ====================

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Events the host delivers to the worker.
#[derive(Debug)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    /// A page posted a message, optionally with a reply port.
    Message {
        data: JsonValue,
        reply: Option<oneshot::Sender<ControlReply>>,
    },
    Sync {
        tag: String,
    },
    PeriodicSync {
        tag: String,
    },
    Push {
        payload: Option<String>,
    },
    NotificationClick {
        action: Option<String>,
    },
}

/// What handling an event produced.
#[derive(Debug)]
pub enum EventOutcome {
    Done,
    /// The worker answered a fetch.
    Response(Response),
    /// The worker did not intercept the fetch; the host goes to the network.
    Passthrough,
    Swept(SweepReport),
}

/// Notifications from the worker to its host.
#[derive(Debug, Clone)]
pub enum ServiceWorkerEvent {
    /// State changed.
    StateChange {
        worker_id: ServiceWorkerId,
        new_state: ServiceWorkerState,
    },
    /// A notification should be displayed.
    ShowNotification(Notification),
    /// An existing window was focused.
    ClientFocused { client_id: String },
    /// A new window should be opened at `url`.
    OpenWindow { client_id: String, url: Url },
}

// ==================== Service Worker ====================

/// The world clock service worker.
pub struct ServiceWorker {
    id: ServiceWorkerId,
    config: WorkerConfig,
    names: CacheNames,
    offline_key: CacheKey,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    strategies: StrategyEngine,
    maintenance: CacheMaintenance,
    lifecycle: RwLock<Lifecycle>,
    clients: RwLock<Clients>,
    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl ServiceWorker {
    /// Create a worker in the `Parsed` state.
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> SwResult<(Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>)> {
        config.validate()?;

        let names = config.cache_names();
        let offline_key = CacheKey::get(&config.offline_url()?);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let strategies = StrategyEngine::new(
            Arc::clone(&store),
            Arc::clone(&fetcher),
            names.clone(),
            offline_key.clone(),
        );
        let maintenance = CacheMaintenance::new(
            Arc::clone(&store),
            names.dynamic_cache.clone(),
            config.retention(),
            offline_key.clone(),
        );

        let worker = Self {
            id: ServiceWorkerId::new(),
            config,
            names,
            offline_key,
            store,
            fetcher,
            strategies,
            maintenance,
            lifecycle: RwLock::new(Lifecycle::default()),
            clients: RwLock::new(Clients::new()),
            event_tx,
        };
        Ok((worker, event_rx))
    }

    /// Worker ID.
    pub fn id(&self) -> ServiceWorkerId {
        self.id
    }

    /// Configuration in use.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Cache names for this version.
    pub fn cache_names(&self) -> &CacheNames {
        &self.names
    }

    /// Key of the offline page in the dynamic cache.
    pub fn offline_key(&self) -> &CacheKey {
        &self.offline_key
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ServiceWorkerState {
        self.lifecycle.read().await.state()
    }

    /// Register an open page.
    pub async fn add_client(&self, client: Client) {
        self.clients.write().await.add(client);
    }

    /// Forget a closed page.
    pub async fn remove_client(&self, id: &str) -> Option<Client> {
        self.clients.write().await.remove(id)
    }

    /// Read access to the client registry.
    pub async fn with_clients<T>(&self, f: impl FnOnce(&Clients) -> T) -> T {
        f(&*self.clients.read().await)
    }

    /// Route an event to its handler.
    pub async fn handle(&self, event: WorkerEvent) -> SwResult<EventOutcome> {
        trace!(?event, "Dispatching event");
        match event {
            WorkerEvent::Install => self.install().await.map(|_| EventOutcome::Done),
            WorkerEvent::Activate => self.activate().await.map(|_| EventOutcome::Done),
            WorkerEvent::Fetch(request) => Ok(match self.fetch(&request).await? {
                Some(response) => EventOutcome::Response(response),
                None => EventOutcome::Passthrough,
            }),
            WorkerEvent::Message { data, reply } => {
                self.on_message(data, reply).await.map(|_| EventOutcome::Done)
            }
            WorkerEvent::Sync { tag } => self.on_sync(&tag).await,
            WorkerEvent::PeriodicSync { tag } => self.on_periodic_sync(&tag).await,
            WorkerEvent::Push { payload } => {
                self.on_push(payload.as_deref());
                Ok(EventOutcome::Done)
            }
            WorkerEvent::NotificationClick { action } => {
                self.on_notification_click(action.as_deref()).await?;
                Ok(EventOutcome::Done)
            }
        }
    }

    /// Install, then activate immediately if skip-waiting was requested.
    pub async fn start(&self) -> SwResult<()> {
        self.install().await?;
        self.activate_if_ready().await
    }

    /// Wait for background cache writes started by fetches.
    pub async fn settle(&self) {
        self.strategies.settle().await;
    }

    // ==================== Lifecycle ====================

    /// Populate both caches. On failure the worker becomes redundant.
    pub async fn install(&self) -> SwResult<()> {
        self.set_state(ServiceWorkerState::Installing).await?;
        info!(version = %self.config.version, "Installing service worker");

        if let Err(e) = self.populate_caches().await {
            warn!(error = %e, "Install failed");
            self.set_state(ServiceWorkerState::Redundant).await?;
            return Err(SwError::InstallFailed(e.to_string()));
        }

        self.set_state(ServiceWorkerState::Installed).await?;
        self.lifecycle.write().await.request_skip_waiting();
        Ok(())
    }

    async fn populate_caches(&self) -> SwResult<()> {
        let urls = self.config.manifest_urls()?;
        self.store.open(&self.names.static_cache).await?;

        // All-or-nothing: fetch everything before storing anything.
        let responses = futures::future::try_join_all(urls.iter().map(|url| async move {
            let response = self.fetcher.fetch(&Request::get(url.clone())).await?;
            if !response.ok() {
                return Err(SwError::Http {
                    url: url.to_string(),
                    status: response.status.as_u16(),
                });
            }
            Ok((CacheKey::get(url), response))
        }))
        .await?;

        for (key, response) in responses {
            self.store.put(&self.names.static_cache, key, response).await?;
        }
        debug!(count = urls.len(), cache = %self.names.static_cache, "Static assets cached");

        self.store.open(&self.names.dynamic_cache).await?;
        self.seed_offline_page().await
    }

    async fn seed_offline_page(&self) -> SwResult<()> {
        self.store
            .put(
                &self.names.dynamic_cache,
                self.offline_key.clone(),
                offline_response(),
            )
            .await
    }

    /// Drop stale caches, take over open pages and announce the new version.
    pub async fn activate(&self) -> SwResult<()> {
        self.set_state(ServiceWorkerState::Activating).await?;
        self.finish_activation().await
    }

    /// Activate if installed with skip-waiting requested. Losing the race to
    /// another caller that already began activating is not an error.
    async fn activate_if_ready(&self) -> SwResult<()> {
        if !self.lifecycle.write().await.begin_activation() {
            trace!("Activation not due or already under way");
            return Ok(());
        }
        self.emit_state(ServiceWorkerState::Activating);
        self.finish_activation().await
    }

    async fn finish_activation(&self) -> SwResult<()> {
        info!(version = %self.config.version, "Activating service worker");

        if let Err(e) = self.take_over().await {
            warn!(error = %e, "Activation failed");
            self.set_state(ServiceWorkerState::Redundant).await?;
            return Err(e);
        }

        self.set_state(ServiceWorkerState::Activated).await
    }

    async fn take_over(&self) -> SwResult<()> {
        for name in self.store.keys().await? {
            if !self.names.is_current(&name) {
                info!(cache = %name, "Deleting old cache");
                self.store.delete(&name).await?;
            }
        }

        // The sweep never evicts the offline page, but a store may lose it.
        self.seed_offline_page().await?;

        let mut clients = self.clients.write().await;
        clients.claim();
        let notified = clients.broadcast(&ClientMessage::SwUpdated {
            version: self.config.version.clone(),
        });
        debug!(notified, "Announced new version");
        Ok(())
    }

    async fn set_state(&self, state: ServiceWorkerState) -> SwResult<()> {
        self.lifecycle.write().await.transition(state)?;
        self.emit_state(state);
        Ok(())
    }

    fn emit_state(&self, state: ServiceWorkerState) {
        let _ = self.event_tx.send(ServiceWorkerEvent::StateChange {
            worker_id: self.id,
            new_state: state,
        });
    }

    // ==================== Fetch ====================

    /// Answer a request, or `None` when it is not intercepted.
    ///
    /// Only an active worker intercepts fetches.
    pub async fn fetch(&self, request: &Request) -> SwResult<Option<Response>> {
        if !self.lifecycle.read().await.is_active() {
            trace!(url = %request.url, "Worker not active, passing through");
            return Ok(None);
        }
        let Some(class) = classify(request, &self.config) else {
            trace!(url = %request.url, "Not intercepted");
            return Ok(None);
        };
        self.strategies.handle(class, request).await.map(Some)
    }

    // ==================== Messages ====================

    /// Handle a control message. Unknown messages are logged and get no reply.
    pub async fn on_message(
        &self,
        data: JsonValue,
        reply: Option<oneshot::Sender<ControlReply>>,
    ) -> SwResult<()> {
        let request = match ControlRequest::parse(&data) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Ignoring control message");
                return Ok(());
            }
        };
        debug!(?request, "Control message");

        match request {
            ControlRequest::SkipWaiting => {
                self.lifecycle.write().await.request_skip_waiting();
                self.activate_if_ready().await?;
            }
            ControlRequest::GetVersion => respond(
                reply,
                ControlReply::Version {
                    version: self.config.version.clone(),
                    features: self.config.features.clone(),
                },
            ),
            ControlRequest::ClearCache => {
                let success = match control::clear_all(self.store.as_ref()).await {
                    Ok(removed) => {
                        info!(removed, "All caches cleared");
                        true
                    }
                    Err(e) => {
                        warn!(error = %e, "Clearing caches failed");
                        false
                    }
                };
                respond(reply, ControlReply::Cleared { success });
            }
            ControlRequest::GetCacheSize => {
                let cache_size = control::cache_size(self.store.as_ref()).await?;
                respond(reply, ControlReply::CacheSize { cache_size });
            }
        }
        Ok(())
    }

    // ==================== Sync ====================

    /// Handle a one-shot background sync.
    pub async fn on_sync(&self, tag: &str) -> SwResult<EventOutcome> {
        match tag {
            SYNC_TIME => Ok(self.announce_network().await),
            SYNC_CACHE_CLEANUP => self.maintenance.sweep().await.map(EventOutcome::Swept),
            other => {
                debug!(tag = other, "Ignoring sync tag");
                Ok(EventOutcome::Done)
            }
        }
    }

    /// Handle a periodic sync.
    pub async fn on_periodic_sync(&self, tag: &str) -> SwResult<EventOutcome> {
        match tag {
            PERIODIC_TIME_UPDATE => Ok(self.announce_network().await),
            PERIODIC_CACHE_MAINTENANCE => self.maintenance.sweep().await.map(EventOutcome::Swept),
            other => {
                debug!(tag = other, "Ignoring periodic sync tag");
                Ok(EventOutcome::Done)
            }
        }
    }

    /// Run the maintenance sweep now.
    pub async fn sweep(&self) -> SwResult<SweepReport> {
        self.maintenance.sweep().await
    }

    async fn announce_network(&self) -> EventOutcome {
        let message = ClientMessage::NetworkAvailable {
            timestamp: Utc::now().timestamp_millis(),
            time_zone: self.config.time_zone.clone(),
        };
        let notified = self.clients.read().await.broadcast(&message);
        debug!(notified, "Announced network availability");
        EventOutcome::Done
    }

    // ==================== Notifications ====================

    /// Show a notification for a push message.
    pub fn on_push(&self, payload: Option<&str>) {
        let notification = Notification::from_push(payload);
        debug!(body = %notification.body, "Push received");
        let _ = self
            .event_tx
            .send(ServiceWorkerEvent::ShowNotification(notification));
    }

    /// Focus an open window, or open one at the root.
    pub async fn on_notification_click(&self, action: Option<&str>) -> SwResult<()> {
        debug!(?action, "Notification clicked");
        let mut clients = self.clients.write().await;

        if let Some(client_id) = clients.focus_first_window() {
            let _ = self
                .event_tx
                .send(ServiceWorkerEvent::ClientFocused { client_id });
            return Ok(());
        }

        let url = self.config.resolve("/")?;
        let client = clients.open_window(url.clone());
        let _ = self.event_tx.send(ServiceWorkerEvent::OpenWindow {
            client_id: client.id,
            url,
        });
        Ok(())
    }
}

fn respond(reply: Option<oneshot::Sender<ControlReply>>, message: ControlReply) {
    match reply {
        Some(tx) => {
            if tx.send(message).is_err() {
                debug!("Reply port closed before response");
            }
        }
        None => trace!("Control message had no reply port"),
    }
}
