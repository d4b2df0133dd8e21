//! Per-upstream cache shard
//!
//! A [`ServerShard`] owns everything belonging to one upstream server: the
//! bounded connection pool, the entry map keyed by verbatim request URL,
//! and the shard's base TTL. The entry map is a concurrent map of
//! [`CacheSlot`]s; writers publish whole new slots (replace-on-write) and
//! readers take consistent snapshots, so nothing is ever mutated in place.

use std::sync::Arc;

use bes_proxy::{BesConnectionConfig, ConnectionPool};
use dashmap::DashMap;
use tracing::info;

use crate::entry::{CacheEntry, EntryCounters, EntrySnapshot};
use crate::error::CoreError;

/// Map value: the published entry plus the key's counter sidecar.
///
/// Every replacement at a key carries the same counters `Arc` forward, so
/// hit/miss counts survive refreshes and tombstoning.
#[derive(Clone)]
pub(crate) struct CacheSlot {
    pub entry: Arc<CacheEntry>,
    pub counters: Arc<EntryCounters>,
}

impl CacheSlot {
    pub fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            entry: self.entry.clone(),
            counters: self.counters.snapshot(),
        }
    }
}

/// Per-upstream state: connection pool, entry store, base TTL.
pub struct ServerShard {
    base_url: String,
    pool: ConnectionPool,
    entries: DashMap<String, CacheSlot>,
    base_max_age: u64,
}

impl ServerShard {
    /// Create a shard for `base_url` with a pool bound to the given
    /// credentials. `base_max_age` must already be resolved (zero is not a
    /// valid TTL here; the cache substitutes its default before calling).
    pub(crate) fn new(
        base_url: String,
        username: String,
        password: String,
        pool_size: usize,
        base_max_age: u64,
        skip_tls_verify: bool,
    ) -> Result<Self, CoreError> {
        let pool = ConnectionPool::new(
            BesConnectionConfig {
                base_url: base_url.clone(),
                username,
                password,
                skip_tls_verify,
            },
            pool_size,
        )?;

        info!(
            "Registered upstream {} (pool: {}, base TTL: {}s)",
            base_url, pool_size, base_max_age
        );

        Ok(Self {
            base_url,
            pool,
            entries: DashMap::new(),
            base_max_age,
        })
    }

    /// The canonical base URL of the upstream this shard fronts
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The TTL applied to entries on first write
    pub fn base_max_age(&self) -> u64 {
        self.base_max_age
    }

    pub(crate) fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Approximate count of idle pool connections (informational)
    pub fn available_connections(&self) -> usize {
        self.pool.len()
    }

    /// Load the current slot for a request URL
    pub(crate) fn load(&self, url: &str) -> Option<CacheSlot> {
        self.entries.get(url).map(|kv| kv.value().clone())
    }

    /// Publish a new entry at `url`, carrying the key's counters forward
    pub(crate) fn store(&self, url: &str, entry: Arc<CacheEntry>, counters: Arc<EntryCounters>) {
        self.entries
            .insert(url.to_string(), CacheSlot { entry, counters });
    }

    /// Pure read of the current state of a key: no store, no counter
    /// mutation. Used by the front-end to decide hit status before a Get.
    pub fn peek(&self, url: &str) -> Option<EntrySnapshot> {
        self.load(url).map(|slot| slot.snapshot())
    }

    /// Number of cached entries, tombstones included
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Consistent point-in-time listing of every key and its snapshot, for
    /// operator displays.
    pub fn snapshot_entries(&self) -> Vec<(String, EntrySnapshot)> {
        self.entries
            .iter()
            .map(|kv| (kv.key().clone(), kv.value().snapshot()))
            .collect()
    }

    /// Resident bytes of cached JSON bodies in this shard
    pub fn memory_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|kv| kv.value().entry.json.len() as u64)
            .sum()
    }

    /// Tombstone every expired entry that still carries a body, reclaiming
    /// its memory while preserving hash, TTL metadata and counters. Returns
    /// the number of entries tombstoned.
    pub(crate) fn sweep(&self, now: i64) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|kv| {
                let entry = &kv.value().entry;
                !entry.is_tombstone() && entry.is_expired(now)
            })
            .map(|kv| kv.key().clone())
            .collect();

        let mut swept = 0;
        for key in expired {
            if let Some(slot) = self.load(&key) {
                // A refresh may have landed since the scan; only tombstone
                // what is still expired with a body.
                if slot.entry.is_tombstone() || !slot.entry.is_expired(now) {
                    continue;
                }
                self.store(&key, Arc::new(slot.entry.tombstoned()), slot.counters);
                swept += 1;
            }
        }
        swept
    }
}
