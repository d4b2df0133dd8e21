//! Background sweeper
//!
//! Large transformed JSON bodies dominate the cache's memory. The sweeper
//! periodically tombstones every expired entry: the body is dropped, the
//! content hash, TTL metadata and counters stay, so the next lookup can
//! still take the TTL-extension path when upstream content is unchanged.
//! It publishes tombstones with the same replace-on-write discipline as
//! every other writer and never blocks readers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::Cache;

/// Sweep interval applied when the configured value is zero
pub(crate) const DEFAULT_INTERVAL_SECS: u64 = 15;

/// Spawn the sweep loop. Runs until process exit.
pub(crate) fn start(cache: Arc<Cache>, interval_secs: u64) {
    let secs = if interval_secs == 0 {
        DEFAULT_INTERVAL_SECS
    } else {
        interval_secs
    };

    info!("Starting cache sweeper (interval: {}s)", secs);

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; nothing can be expired yet.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let now = Utc::now().timestamp();

            let mut swept = 0;
            for shard in cache.shards() {
                swept += shard.sweep(now);
            }

            if swept > 0 {
                debug!("Sweeper reclaimed {} expired bodies", swept);
            }
        }
    });
}
