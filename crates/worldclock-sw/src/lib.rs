//! # World Clock Service Worker
//!
//! Offline caching for the World Clock widget.
//!
//! ## Features
//!
//! - **Versioned caches**: `<app>-static-v<version>` / `<app>-dynamic-v<version>`,
//!   old generations deleted on activation
//! - **Per-class strategies**: network-first for pages (with an offline page),
//!   cache-first for fonts and static assets, network-first with cache
//!   fallback for everything else
//! - **Maintenance**: dynamic entries older than the retention window are swept
//! - **Control channel**: `GET_VERSION`, `CLEAR_CACHE`, `GET_CACHE_SIZE`,
//!   `SKIP_WAITING`, plus `SW_UPDATED` / `NETWORK_AVAILABLE` pushes
//!
//! ## Architecture
//!
//! ```text
//! WorkerEvent ──► ServiceWorker::handle
//!                    ├── Install / Activate ──► Lifecycle + CacheStore
//!                    ├── Fetch ──► classify ──► StrategyEngine ──► CacheStore / Fetcher
//!                    ├── Message ──► ControlRequest ──► ControlReply
//!                    ├── Sync / PeriodicSync ──► CacheMaintenance | ClientMessage
//!                    └── Push / NotificationClick ──► ServiceWorkerEvent (to host)
//! ```

pub mod cache;
pub mod classify;
pub mod clients;
pub mod config;
pub mod control;
pub mod error;
pub mod fetch;
pub mod lifecycle;
pub mod maintenance;
pub mod notification;
pub mod offline;
pub mod request;
pub mod strategy;
pub mod worker;

pub use cache::{CacheEntry, CacheKey, CacheStore, MemoryCacheStorage};
pub use classify::{classify, ResourceClass};
pub use clients::{Client, Clients};
pub use config::{CacheNames, WorkerConfig};
pub use control::{ClientMessage, ControlReply, ControlRequest};
pub use error::{SwError, SwResult};
pub use fetch::{Fetcher, FetcherConfig, HttpFetcher, OfflineFetcher};
pub use lifecycle::{Lifecycle, ServiceWorkerState};
pub use maintenance::{CacheMaintenance, SweepReport};
pub use notification::Notification;
pub use request::{Destination, Request, Response, ResponseSource};
pub use strategy::{Strategy, StrategyEngine};
pub use worker::{EventOutcome, ServiceWorker, ServiceWorkerEvent, ServiceWorkerId, WorkerEvent};
