//! Page ↔ worker message protocol.
//!
//! Pages post `{ "type": "GET_VERSION" }` and friends; replies go back on
//! the port the page supplied. The worker pushes [`ClientMessage`]s to
//! every open page on its own.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::cache::CacheStore;
use crate::error::{SwError, SwResult};

/// Requests a page can send to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlRequest {
    SkipWaiting,
    GetVersion,
    ClearCache,
    GetCacheSize,
}

impl ControlRequest {
    /// Decode a posted message.
    pub fn parse(data: &JsonValue) -> SwResult<Self> {
        serde_json::from_value(data.clone()).map_err(|_| {
            let kind = data
                .get("type")
                .and_then(JsonValue::as_str)
                .unwrap_or("<missing type>");
            SwError::UnrecognizedMessage(kind.to_string())
        })
    }
}

/// Replies sent on the page-supplied port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlReply {
    Version {
        version: String,
        features: Vec<String>,
    },
    Cleared {
        success: bool,
    },
    CacheSize {
        #[serde(rename = "cacheSize")]
        cache_size: u64,
    },
}

/// Messages the worker pushes to open pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// A new worker version took control.
    SwUpdated { version: String },
    /// Connectivity is back; `timestamp` is epoch milliseconds.
    NetworkAvailable {
        timestamp: i64,
        #[serde(rename = "timeZone")]
        time_zone: String,
    },
}

/// Total body bytes across every cache.
pub async fn cache_size(store: &dyn CacheStore) -> SwResult<u64> {
    let mut total = 0u64;
    for name in store.keys().await? {
        for key in store.entry_keys(&name).await? {
            if let Some(response) = store.match_in(&name, &key).await? {
                total += response.body.len() as u64;
            }
        }
    }
    Ok(total)
}

/// Delete every cache. Returns how many were removed.
pub async fn clear_all(store: &dyn CacheStore) -> SwResult<usize> {
    let names = store.keys().await?;
    let results = futures::future::join_all(names.iter().map(|n| store.delete(n))).await;

    let mut removed = 0;
    for (name, result) in names.iter().zip(results) {
        if result? {
            debug!(cache = %name, "Cache cleared");
            removed += 1;
        }
    }
    Ok(removed)
}
