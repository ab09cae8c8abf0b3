//! Command-line driver for the World Clock service worker.
//!
//! Installs and activates a worker against an in-memory cache, then routes
//! each `--url` through it and prints one JSON line per result.
//!
//! ## Usage
//!
//! ```bash
//! # Fetch the page and a stylesheet through the worker
//! worldclock-cli --url / --url /styles.css
//!
//! # See what a page gets with no network (the offline page)
//! worldclock-cli --offline --url /modern.html
//!
//! # Use a config file and run a maintenance sweep afterwards
//! worldclock-cli --config worker.json --url /api/zones --sweep
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{info, warn};
use worldclock_common::{init_logging, LogConfig, LogFormat, Result, ResultExt};
use worldclock_sw::{
    ControlReply, Destination, EventOutcome, Fetcher, FetcherConfig, HttpFetcher,
    MemoryCacheStorage, OfflineFetcher, Request, Response, ServiceWorker, SwResult,
    WorkerConfig, WorkerEvent,
};

#[derive(Parser)]
#[command(name = "worldclock-cli")]
#[command(about = "Drive the World Clock service worker from the command line")]
struct Cli {
    /// Worker configuration (JSON). Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// URL or origin-relative path to fetch through the worker
    #[arg(short, long = "url")]
    urls: Vec<String>,

    /// Treat every fetch after install as a network failure
    #[arg(long)]
    offline: bool,

    /// Run a maintenance sweep after fetching
    #[arg(long)]
    sweep: bool,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log format: pretty, compact or json
    #[arg(long, default_value = "compact")]
    log_format: LogFormat,
}

#[derive(Serialize)]
struct FetchLine {
    url: String,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl FetchLine {
    fn new(url: &str, outcome: &'static str) -> Self {
        Self {
            url: url.to_string(),
            outcome,
            status: None,
            source: None,
            content_type: None,
            bytes: None,
            error: None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogConfig::from_verbosity(cli.verbose).with_format(cli.log_format));

    let config = match &cli.config {
        Some(path) => WorkerConfig::load(path).await?,
        None => WorkerConfig::default(),
    };

    // Install needs the network; --offline only affects fetches afterwards.
    let fetcher = Arc::new(SwitchableFetcher::new(HttpFetcher::new(FetcherConfig::default())?));
    let store = Arc::new(MemoryCacheStorage::new());

    let (worker, _events) = ServiceWorker::new(config.clone(), store, fetcher.clone())?;
    worker.start().await?;
    info!(state = ?worker.state().await, "Worker ready");

    if cli.offline {
        fetcher.go_offline();
    }

    for raw in &cli.urls {
        let line = fetch_one(&worker, &config, raw).await;
        println!("{}", serde_json::to_string(&line).context("encoding output line")?);
    }
    worker.settle().await;

    if cli.sweep {
        let report = worker.sweep().await?;
        println!("{}", serde_json::json!({ "sweep": {
            "examined": report.examined,
            "evicted": report.evicted,
            "failed": report.failed,
        }}));
    }

    let (tx, rx) = oneshot::channel();
    worker
        .handle(WorkerEvent::Message {
            data: serde_json::json!({ "type": "GET_CACHE_SIZE" }),
            reply: Some(tx),
        })
        .await?;
    match rx.await {
        Ok(reply @ ControlReply::CacheSize { .. }) => {
            println!("{}", serde_json::to_string(&reply).context("encoding output line")?)
        }
        Ok(other) => warn!(?other, "Unexpected reply to GET_CACHE_SIZE"),
        Err(_) => warn!("No reply to GET_CACHE_SIZE"),
    }

    Ok(())
}

/// Live network until switched off, then nothing but failures.
struct SwitchableFetcher {
    live: HttpFetcher,
    offline: AtomicBool,
}

impl SwitchableFetcher {
    fn new(live: HttpFetcher) -> Self {
        Self {
            live,
            offline: AtomicBool::new(false),
        }
    }

    fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for SwitchableFetcher {
    async fn fetch(&self, request: &Request) -> SwResult<Response> {
        if self.offline.load(Ordering::SeqCst) {
            return OfflineFetcher.fetch(request).await;
        }
        self.live.fetch(request).await
    }
}

async fn fetch_one(worker: &ServiceWorker, config: &WorkerConfig, raw: &str) -> FetchLine {
    let url = match config.resolve(raw) {
        Ok(url) => url,
        Err(e) => {
            let mut line = FetchLine::new(raw, "error");
            line.error = Some(e.to_string());
            return line;
        }
    };

    let request = match url.path().rsplit('.').next() {
        Some("css") => Request::get(url.clone()).with_destination(Destination::Style),
        Some("js") => Request::get(url.clone()).with_destination(Destination::Script),
        Some("svg" | "png" | "jpg" | "ico") => {
            Request::get(url.clone()).with_destination(Destination::Image)
        }
        Some("json" | "woff" | "woff2") => Request::get(url.clone()),
        _ => Request::navigate(url.clone()),
    };

    match worker.handle(WorkerEvent::Fetch(request)).await {
        Ok(EventOutcome::Response(response)) => {
            let mut line = FetchLine::new(url.as_str(), "response");
            line.status = Some(response.status.as_u16());
            line.source = Some(format!("{:?}", response.source).to_lowercase());
            line.content_type = response.content_type().map(str::to_string);
            line.bytes = Some(response.body.len());
            line
        }
        Ok(_) => FetchLine::new(url.as_str(), "passthrough"),
        Err(e) => {
            let mut line = FetchLine::new(url.as_str(), "error");
            line.error = Some(e.to_string());
            line
        }
    }
}
