//! Age-based eviction for the dynamic cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheKey, CacheStore};
use crate::error::SwResult;

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries looked at (the offline page is not counted).
    pub examined: usize,
    pub evicted: usize,
    /// Entries that could not be read or deleted; they are left in place.
    pub failed: usize,
}

/// Deletes dynamic cache entries older than the retention window.
///
/// The offline page is never swept.
pub struct CacheMaintenance {
    store: Arc<dyn CacheStore>,
    cache: String,
    retention: Duration,
    pinned: CacheKey,
}

impl CacheMaintenance {
    /// Create a sweeper for `cache`, never touching `pinned`.
    pub fn new(
        store: Arc<dyn CacheStore>,
        cache: String,
        retention: Duration,
        pinned: CacheKey,
    ) -> Self {
        Self {
            store,
            cache,
            retention,
            pinned,
        }
    }

    /// Sweep against the current time.
    pub async fn sweep(&self) -> SwResult<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep as if the current time were `now`.
    ///
    /// Only listing the cache can fail the whole sweep; per-entry failures
    /// are counted and skipped.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SwResult<SweepReport> {
        let keys = self.store.entry_keys(&self.cache).await?;
        let mut report = SweepReport::default();

        for key in keys.into_iter().filter(|k| *k != self.pinned) {
            report.examined += 1;
            match self.sweep_entry(&key, now).await {
                Ok(true) => report.evicted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(%key, error = %e, "Sweep failed for entry");
                    report.failed += 1;
                }
            }
        }

        info!(
            cache = %self.cache,
            examined = report.examined,
            evicted = report.evicted,
            failed = report.failed,
            "Cache maintenance finished"
        );
        Ok(report)
    }

    async fn sweep_entry(&self, key: &CacheKey, now: DateTime<Utc>) -> SwResult<bool> {
        let Some(entry) = self.store.entry(&self.cache, key).await? else {
            // Deleted concurrently.
            return Ok(false);
        };

        let stale = match entry_time(&entry) {
            Some(stored) => is_expired(stored, now, self.retention),
            None => {
                warn!(%key, "Entry has no usable timestamp, evicting");
                true
            }
        };

        if !stale {
            return Ok(false);
        }
        debug!(%key, "Evicting stale entry");
        self.store.delete_entry(&self.cache, key).await
    }
}

/// Write time of an entry: the store's record, else the `Date` header.
pub fn entry_time(entry: &CacheEntry) -> Option<DateTime<Utc>> {
    entry
        .stored_at
        .or_else(|| entry.response.date().and_then(parse_http_date))
}

/// Parse an HTTP `Date` header value (IMF-fixdate).
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn is_expired(stored: DateTime<Utc>, now: DateTime<Utc>, retention: Duration) -> bool {
    match (now - stored).to_std() {
        Ok(age) => age > retention,
        // Written in the future (clock skew): not expired.
        Err(_) => false,
    }
}
