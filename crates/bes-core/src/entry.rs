//! Cache entries and their per-key counters
//!
//! A [`CacheEntry`] is immutable once published. Every update writes a new
//! entry object into the shard map at the same key; concurrent readers keep
//! whatever snapshot they loaded. Hit and miss counters live outside the
//! entry in [`EntryCounters`], bumped by atomic add, so counting never
//! requires republishing an entry.

use std::sync::atomic::{AtomicU64, Ordering};

/// One cached upstream response, keyed by the verbatim request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Unix seconds of when this entry was last written or confirmed
    pub timestamp: i64,
    /// Transformed JSON body. Empty when the sweeper has reclaimed the
    /// body; such a tombstone's metadata is still authoritative.
    pub json: String,
    /// Current TTL in seconds. May exceed `base_max_age` after successful
    /// extensions, capped by the cache's max lifetime.
    pub max_age: u64,
    /// The shard's TTL at the time of first write; the extension increment
    /// and the reset value when content changes.
    pub base_max_age: u64,
    /// Hex MD5 of the raw upstream response bytes, pre-transform. Used only
    /// to detect change across refreshes.
    pub content_hash: String,
}

impl CacheEntry {
    /// Entry for a response fetched with no prior state at this key.
    pub fn fresh(json: String, content_hash: String, base_max_age: u64, now: i64) -> Self {
        Self {
            timestamp: now,
            json,
            max_age: base_max_age,
            base_max_age,
            content_hash,
        }
    }

    /// Successor entry after a refresh found byte-identical upstream
    /// content: the TTL grows by one `base_max_age` increment, capped at
    /// `max_lifetime`, and the prior hash is carried forward. Restores any
    /// tombstoned body.
    pub fn extended(&self, json: String, max_lifetime: u64, now: i64) -> Self {
        Self {
            timestamp: now,
            json,
            max_age: (self.max_age + self.base_max_age).min(max_lifetime),
            base_max_age: self.base_max_age,
            content_hash: self.content_hash.clone(),
        }
    }

    /// Successor entry after a refresh found changed upstream content: the
    /// TTL restarts from `base_max_age` and the hash is replaced.
    pub fn changed(&self, json: String, content_hash: String, now: i64) -> Self {
        Self {
            timestamp: now,
            json,
            max_age: self.base_max_age,
            base_max_age: self.base_max_age,
            content_hash,
        }
    }

    /// Tombstone of this entry: body reclaimed, all metadata kept.
    pub fn tombstoned(&self) -> Self {
        Self {
            timestamp: self.timestamp,
            json: String::new(),
            max_age: self.max_age,
            base_max_age: self.base_max_age,
            content_hash: self.content_hash.clone(),
        }
    }

    /// Whether the body has been reclaimed by the sweeper
    pub fn is_tombstone(&self) -> bool {
        self.json.is_empty()
    }

    /// Whether this entry's TTL has elapsed at `now`
    pub fn is_expired(&self, now: i64) -> bool {
        now - self.timestamp > self.max_age as i64
    }

    /// Remaining time to live in seconds at `now`, clamped to zero
    pub fn ttl(&self, now: i64) -> i64 {
        (self.timestamp + self.max_age as i64 - now).max(0)
    }
}

/// Per-key hit/miss counters, shared by every entry published at a key.
///
/// Slot replacements (refreshes, tombstones) carry the same counter object
/// forward, so counts survive every rewrite. Observations are eventually
/// consistent: a cold-miss race can mint two counter objects and the losing
/// store's bump is dropped with it.
#[derive(Debug, Default)]
pub struct EntryCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EntryCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a key's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub hits: u64,
    pub misses: u64,
}

/// Consistent view of one cache key, as returned by lookups: the entry the
/// reader observed plus the counter values at load time.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub entry: std::sync::Arc<CacheEntry>,
    pub counters: CounterSnapshot,
}

impl EntrySnapshot {
    /// Whether a lookup at `now` would serve this snapshot without
    /// contacting upstream.
    pub fn is_servable(&self, now: i64) -> bool {
        !self.entry.is_tombstone() && !self.entry.is_expired(now)
    }
}
