//! The process-wide cache
//!
//! [`Cache`] is created once at startup and shared as `Arc<Cache>` by the
//! HTTP front-end, the populator and the sweeper. It maps canonical base
//! URLs to per-upstream [`ServerShard`]s; each shard maps verbatim request
//! URLs to immutable entries.
//!
//! Lookup policy: a present, non-empty, unexpired entry is a hit and is
//! served from memory. Anything else contacts upstream through the shard's
//! pool, then compares the MD5 of the raw upstream bytes against the stored
//! hash: unchanged content earns a TTL extension of one `base_max_age`
//! increment (capped at the max lifetime), changed content resets the TTL
//! to `base_max_age`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};
use url::Url;

use crate::entry::{EntryCounters, EntrySnapshot};
use crate::error::CoreError;
use crate::fetch;
use crate::shard::ServerShard;
use crate::{populate, sweeper};

/// TTL applied when the configured default is zero
const DEFAULT_MAX_AGE_SECS: u64 = 300;

/// Ceiling applied when the configured max lifetime is zero
const DEFAULT_MAX_LIFETIME_SECS: u64 = 86_400;

/// Pool size applied when a server is registered with zero
const DEFAULT_POOL_SIZE: usize = 5;

/// Cache-wide tunables
#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    /// Default TTL in seconds for shards registered without their own
    pub default_max_age: u64,
    /// Absolute ceiling on any entry's TTL after extensions
    pub max_lifetime: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            default_max_age: DEFAULT_MAX_AGE_SECS,
            max_lifetime: DEFAULT_MAX_LIFETIME_SECS,
        }
    }
}

/// Registration parameters for one upstream server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Any URL on the upstream; only scheme, host and port are kept
    pub url: String,
    /// Username for HTTP Basic authentication
    pub username: String,
    /// Password for HTTP Basic authentication
    pub password: String,
    /// Connection pool size; zero falls back to the default of 5
    pub pool_size: usize,
    /// Base TTL in seconds; zero inherits the cache default
    pub max_age: u64,
    /// Skip TLS certificate verification for this upstream
    pub skip_tls_verify: bool,
}

/// The cache singleton: all registered upstreams and their entries.
pub struct Cache {
    shards: DashMap<String, Arc<ServerShard>>,
    default_max_age: u64,
    max_lifetime: u64,
    sweeper_started: AtomicBool,
}

impl Cache {
    /// Create the cache. Zero options fall back to their defaults
    /// (300 s TTL, 86 400 s lifetime ceiling).
    pub fn new(options: CacheOptions) -> Self {
        let default_max_age = if options.default_max_age == 0 {
            DEFAULT_MAX_AGE_SECS
        } else {
            options.default_max_age
        };
        let max_lifetime = if options.max_lifetime == 0 {
            DEFAULT_MAX_LIFETIME_SECS
        } else {
            options.max_lifetime
        };

        Self {
            shards: DashMap::new(),
            default_max_age,
            max_lifetime,
            sweeper_started: AtomicBool::new(false),
        }
    }

    /// The TTL shards inherit when registered without their own
    pub fn default_max_age(&self) -> u64 {
        self.default_max_age
    }

    /// The ceiling on any entry's TTL after extensions
    pub fn max_lifetime(&self) -> u64 {
        self.max_lifetime
    }

    /// Register an upstream server.
    ///
    /// The URL is canonicalized to `scheme://host[:port]`; registering the
    /// same base twice fails with [`CoreError::ShardExists`] and leaves the
    /// cache untouched.
    pub fn add_server(&self, config: ServerConfig) -> Result<(), CoreError> {
        let base_url = canonical_base_url(&config.url)?;
        let max_age = if config.max_age == 0 {
            self.default_max_age
        } else {
            config.max_age
        };
        let pool_size = if config.pool_size == 0 {
            DEFAULT_POOL_SIZE
        } else {
            config.pool_size
        };

        match self.shards.entry(base_url.clone()) {
            dashmap::Entry::Occupied(_) => Err(CoreError::ShardExists(base_url)),
            dashmap::Entry::Vacant(slot) => {
                let shard = ServerShard::new(
                    base_url,
                    config.username,
                    config.password,
                    pool_size,
                    max_age,
                    config.skip_tls_verify,
                )?;
                slot.insert(Arc::new(shard));
                Ok(())
            }
        }
    }

    /// Look up a request URL, fetching or refreshing from upstream as
    /// needed. This is the sole hot-path entry point.
    pub async fn get(&self, url: &str) -> Result<EntrySnapshot, CoreError> {
        let base_url = canonical_base_url(url)?;
        let shard = self
            .shards
            .get(&base_url)
            .map(|kv| kv.value().clone())
            .ok_or(CoreError::NoShardForUrl(base_url))?;

        let now = Utc::now().timestamp();

        let slot = match shard.load(url) {
            None => {
                // Cold miss: nothing known about this key yet.
                debug!("Cache miss (cold): {}", url);
                let fresh = Arc::new(fetch::fetch_entry(&shard, url).await?);
                let counters = Arc::new(EntryCounters::default());
                counters.record_miss();
                shard.store(url, fresh.clone(), counters.clone());
                return Ok(EntrySnapshot {
                    entry: fresh,
                    counters: counters.snapshot(),
                });
            }
            Some(slot) => slot,
        };

        if !slot.entry.is_tombstone() && !slot.entry.is_expired(now) {
            slot.counters.record_hit();
            debug!("Cache hit: {}", url);
            return Ok(slot.snapshot());
        }

        // Expired or tombstoned: refresh from upstream, then decide between
        // TTL extension (content unchanged) and reset (content changed).
        debug!("Cache refresh: {}", url);
        let fresh = fetch::fetch_entry(&shard, url).await?;

        let unchanged = !slot.entry.content_hash.is_empty()
            && fresh.content_hash == slot.entry.content_hash;

        let updated = if unchanged {
            slot.entry
                .extended(fresh.json, self.max_lifetime, fresh.timestamp)
        } else {
            slot.entry
                .changed(fresh.json, fresh.content_hash, fresh.timestamp)
        };

        slot.counters.record_miss();
        let updated = Arc::new(updated);
        shard.store(url, updated.clone(), slot.counters.clone());

        Ok(EntrySnapshot {
            entry: updated,
            counters: slot.counters.snapshot(),
        })
    }

    /// Pure read of a key's current state: no store, no counter bumps, no
    /// upstream contact. Returns `None` when the URL is malformed, its
    /// upstream is unregistered, or the key has never been cached.
    pub fn peek(&self, url: &str) -> Option<EntrySnapshot> {
        let base_url = canonical_base_url(url).ok()?;
        let shard = self.shards.get(&base_url)?;
        shard.peek(url)
    }

    /// Snapshot of every registered shard, for operator displays
    pub fn shards(&self) -> Vec<Arc<ServerShard>> {
        self.shards.iter().map(|kv| kv.value().clone()).collect()
    }

    /// Number of registered upstreams
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Start the background sweeper. Only the first call spawns the task;
    /// a zero interval falls back to the default of 15 seconds.
    pub fn start_sweeper(self: &Arc<Self>, interval_secs: u64) {
        if self.sweeper_started.swap(true, Ordering::SeqCst) {
            warn!("Sweeper already started, ignoring");
            return;
        }
        sweeper::start(self.clone(), interval_secs);
    }

    /// Pre-warm the cache for an upstream's well-known index endpoints and
    /// the resources they reference. Child fetches run as fire-and-forget
    /// background tasks; only index failures surface.
    pub async fn populate_core_types(self: &Arc<Self>, server_url: &str) -> Result<(), CoreError> {
        populate::run(self, server_url).await
    }
}

/// Reduce any request URL to the canonical `scheme://host[:port]` its shard
/// is keyed by. The port appears only when the URL carries one explicitly.
pub(crate) fn canonical_base_url(url: &str) -> Result<String, CoreError> {
    let parsed =
        Url::parse(url).map_err(|e| CoreError::InvalidUrl(format!("{}: {}", url, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| CoreError::InvalidUrl(format!("{}: missing host", url)))?;

    Ok(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    use axum::extract::State;
    use axum::http::{StatusCode, Uri};
    use axum::Router;
    use md5::{Digest, Md5};

    const COMPUTERS_XML: &str = concat!(
        r#"<BESAPI xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
        r#"<Computer Resource="https://bes:52311/api/computer/1"><ID>1</ID></Computer>"#,
        r#"<Computer Resource="https://bes:52311/api/computer/2"><ID>2</ID></Computer>"#,
        r#"</BESAPI>"#
    );

    const COMPUTERS_XML_CHANGED: &str = concat!(
        r#"<BESAPI xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
        r#"<Computer Resource="https://bes:52311/api/computer/3"><ID>3</ID></Computer>"#,
        r#"</BESAPI>"#
    );

    const STUB_XML: &str = "<BESAPI><Stub/></BESAPI>";

    fn md5_hex(body: &str) -> String {
        hex::encode(Md5::digest(body.as_bytes()))
    }

    /// In-process upstream: path (with query) -> (status, body), counting
    /// every request it serves. Unknown paths answer a stub document so
    /// populator children always succeed.
    #[derive(Clone, Default)]
    struct FakeUpstream {
        bodies: Arc<Mutex<HashMap<String, (u16, String)>>>,
        requests: Arc<AtomicUsize>,
    }

    impl FakeUpstream {
        fn set(&self, path: &str, body: &str) {
            self.set_status(path, 200, body);
        }

        fn set_status(&self, path: &str, status: u16, body: &str) {
            self.bodies
                .lock()
                .unwrap()
                .insert(path.to_string(), (status, body.to_string()));
        }

        fn requests(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    async fn serve(State(upstream): State<FakeUpstream>, uri: Uri) -> (StatusCode, String) {
        upstream.requests.fetch_add(1, Ordering::SeqCst);
        let key = match uri.query() {
            Some(q) => format!("{}?{}", uri.path(), q),
            None => uri.path().to_string(),
        };
        let (status, body) = upstream
            .bodies
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or((200, STUB_XML.to_string()));
        (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
    }

    async fn spawn_upstream(upstream: FakeUpstream) -> String {
        let app = Router::new().fallback(serve).with_state(upstream);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://127.0.0.1:{}", addr.port())
    }

    async fn cache_for(
        upstream: &FakeUpstream,
        max_age: u64,
        max_lifetime: u64,
    ) -> (Arc<Cache>, String) {
        let base = spawn_upstream(upstream.clone()).await;
        let cache = Arc::new(Cache::new(CacheOptions {
            default_max_age: 300,
            max_lifetime,
        }));
        cache
            .add_server(ServerConfig {
                url: base.clone(),
                username: "operator".to_string(),
                password: "secret".to_string(),
                pool_size: 2,
                max_age,
                skip_tls_verify: false,
            })
            .unwrap();
        (cache, base)
    }

    /// Shift a stored entry's timestamp into the past so expiry paths can
    /// be exercised without sleeping through real TTLs.
    fn backdate(cache: &Cache, url: &str, secs: i64) {
        let base = canonical_base_url(url).unwrap();
        let shard = cache.shards.get(&base).unwrap().clone();
        let slot = shard.load(url).unwrap();
        let mut entry = (*slot.entry).clone();
        entry.timestamp -= secs;
        shard.store(url, Arc::new(entry), slot.counters);
    }

    fn shard_of(cache: &Cache, base: &str) -> Arc<ServerShard> {
        cache.shards.get(base).unwrap().clone()
    }

    #[tokio::test]
    async fn cold_miss_fetches_transforms_and_stores() {
        let upstream = FakeUpstream::default();
        upstream.set("/api/computers", COMPUTERS_XML);
        let (cache, base) = cache_for(&upstream, 60, 600).await;

        let url = format!("{}/api/computers", base);
        let snap = cache.get(&url).await.unwrap();

        assert_eq!(snap.entry.max_age, 60);
        assert_eq!(snap.entry.base_max_age, 60);
        assert_eq!(snap.entry.content_hash, md5_hex(COMPUTERS_XML));
        assert_eq!(snap.counters.misses, 1);
        assert_eq!(snap.counters.hits, 0);

        let value: serde_json::Value = serde_json::from_str(&snap.entry.json).unwrap();
        assert_eq!(value["Computer"][0]["ID"], "1");
        assert_eq!(
            value["Computer"][1]["Resource"],
            "https://bes:52311/api/computer/2"
        );
    }

    #[tokio::test]
    async fn hit_serves_from_memory() {
        let upstream = FakeUpstream::default();
        upstream.set("/api/computers", COMPUTERS_XML);
        let (cache, base) = cache_for(&upstream, 60, 600).await;

        let url = format!("{}/api/computers", base);
        let first = cache.get(&url).await.unwrap();
        let second = cache.get(&url).await.unwrap();

        assert_eq!(upstream.requests(), 1);
        assert_eq!(second.entry, first.entry);
        assert_eq!(second.counters.hits, 1);
        assert_eq!(second.counters.misses, 1);
    }

    #[tokio::test]
    async fn unchanged_content_extends_max_age() {
        let upstream = FakeUpstream::default();
        upstream.set("/api/computers", COMPUTERS_XML);
        let (cache, base) = cache_for(&upstream, 60, 600).await;

        let url = format!("{}/api/computers", base);
        cache.get(&url).await.unwrap();
        backdate(&cache, &url, 61);

        let refreshed = cache.get(&url).await.unwrap();
        assert_eq!(upstream.requests(), 2);
        assert_eq!(refreshed.entry.max_age, 120);
        assert_eq!(refreshed.entry.base_max_age, 60);
        assert_eq!(refreshed.entry.content_hash, md5_hex(COMPUTERS_XML));
        assert_eq!(refreshed.counters.misses, 2);

        // Two successive unchanged refreshes extend twice, not once
        backdate(&cache, &url, 121);
        let again = cache.get(&url).await.unwrap();
        assert_eq!(again.entry.max_age, 180);
    }

    #[tokio::test]
    async fn changed_content_resets_max_age() {
        let upstream = FakeUpstream::default();
        upstream.set("/api/computers", COMPUTERS_XML);
        let (cache, base) = cache_for(&upstream, 60, 600).await;

        let url = format!("{}/api/computers", base);
        cache.get(&url).await.unwrap();
        backdate(&cache, &url, 61);
        let extended = cache.get(&url).await.unwrap();
        assert_eq!(extended.entry.max_age, 120);

        upstream.set("/api/computers", COMPUTERS_XML_CHANGED);
        backdate(&cache, &url, 121);

        let reset = cache.get(&url).await.unwrap();
        assert_eq!(reset.entry.max_age, 60);
        assert_eq!(reset.entry.content_hash, md5_hex(COMPUTERS_XML_CHANGED));

        let value: serde_json::Value = serde_json::from_str(&reset.entry.json).unwrap();
        assert_eq!(value["Computer"]["ID"], "3");
    }

    #[tokio::test]
    async fn extension_caps_at_max_lifetime() {
        let upstream = FakeUpstream::default();
        upstream.set("/api/computers", COMPUTERS_XML);
        let (cache, base) = cache_for(&upstream, 60, 150).await;

        let url = format!("{}/api/computers", base);
        cache.get(&url).await.unwrap();

        backdate(&cache, &url, 61);
        assert_eq!(cache.get(&url).await.unwrap().entry.max_age, 120);

        backdate(&cache, &url, 121);
        assert_eq!(cache.get(&url).await.unwrap().entry.max_age, 150);

        backdate(&cache, &url, 151);
        assert_eq!(cache.get(&url).await.unwrap().entry.max_age, 150);
    }

    #[tokio::test]
    async fn declared_json_body_cached_verbatim() {
        let body = "{\"result\": [\"computer 1\", \"computer 2\"],  \"total\": 2}";
        let upstream = FakeUpstream::default();
        upstream.set("/api/query?relevance=x&output=json", body);
        let (cache, base) = cache_for(&upstream, 60, 600).await;

        let url = format!("{}/api/query?relevance=x&output=json", base);
        let snap = cache.get(&url).await.unwrap();

        assert_eq!(snap.entry.json, body);
        assert_eq!(snap.entry.content_hash, md5_hex(body));
    }

    #[tokio::test]
    async fn tombstone_refresh_restores_body_and_extends() {
        let upstream = FakeUpstream::default();
        upstream.set("/api/computers", COMPUTERS_XML);
        let (cache, base) = cache_for(&upstream, 60, 600).await;

        let url = format!("{}/api/computers", base);
        cache.get(&url).await.unwrap();
        backdate(&cache, &url, 61);

        let shard = shard_of(&cache, &base);
        assert_eq!(shard.sweep(Utc::now().timestamp()), 1);
        let tombstone = cache.peek(&url).unwrap();
        assert!(tombstone.entry.is_tombstone());
        assert_eq!(tombstone.entry.content_hash, md5_hex(COMPUTERS_XML));
        assert_eq!(tombstone.counters.misses, 1);

        // The preserved hash still drives the extension path
        let revived = cache.get(&url).await.unwrap();
        assert!(!revived.entry.is_tombstone());
        assert_eq!(revived.entry.max_age, 120);
        assert_eq!(revived.entry.content_hash, md5_hex(COMPUTERS_XML));
        assert_eq!(revived.counters.misses, 2);
    }

    #[tokio::test]
    async fn duplicate_server_rejected() {
        let upstream = FakeUpstream::default();
        let (cache, base) = cache_for(&upstream, 60, 600).await;

        // Same upstream through a deep URL still canonicalizes to the same
        // shard key.
        let result = cache.add_server(ServerConfig {
            url: format!("{}/api/computers?count=10", base),
            username: "other".to_string(),
            password: "other".to_string(),
            pool_size: 9,
            max_age: 0,
            skip_tls_verify: true,
        });

        assert!(matches!(result, Err(CoreError::ShardExists(_))));
        assert_eq!(cache.shard_count(), 1);
        assert_eq!(shard_of(&cache, &base).base_max_age(), 60);
    }

    #[tokio::test]
    async fn unregistered_upstream_rejected() {
        let cache = Arc::new(Cache::new(CacheOptions::default()));
        let err = cache
            .get("https://unknown.example.com:52311/api/computers")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NoShardForUrl(_)));
    }

    #[tokio::test]
    async fn upstream_error_propagates_and_releases_connection() {
        let upstream = FakeUpstream::default();
        upstream.set_status("/api/computers", 500, "boom");
        let (cache, base) = cache_for(&upstream, 60, 600).await;

        let url = format!("{}/api/computers", base);
        let err = cache.get(&url).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Proxy(bes_proxy::ProxyError::Upstream { status: 500, .. })
        ));

        // Nothing was cached and no pool capacity leaked
        assert!(cache.peek(&url).is_none());
        let shard = shard_of(&cache, &base);
        assert_eq!(shard.available_connections(), 2);

        upstream.set("/api/computers", COMPUTERS_XML);
        assert!(cache.get(&url).await.is_ok());
    }

    #[tokio::test]
    async fn parse_error_propagates_and_releases_connection() {
        let upstream = FakeUpstream::default();
        upstream.set("/api/computers", "<BESAPI><Computer>");
        let (cache, base) = cache_for(&upstream, 60, 600).await;

        let url = format!("{}/api/computers", base);
        let err = cache.get(&url).await.unwrap_err();
        assert!(matches!(err, CoreError::Parse(_)));
        assert_eq!(shard_of(&cache, &base).available_connections(), 2);
    }

    #[tokio::test]
    async fn peek_never_mutates() {
        let upstream = FakeUpstream::default();
        upstream.set("/api/computers", COMPUTERS_XML);
        let (cache, base) = cache_for(&upstream, 60, 600).await;

        let url = format!("{}/api/computers", base);
        assert!(cache.peek(&url).is_none());
        assert!(cache.peek("not a url").is_none());

        cache.get(&url).await.unwrap();
        cache.peek(&url).unwrap();
        cache.peek(&url).unwrap();

        let snap = cache.peek(&url).unwrap();
        assert_eq!(snap.counters.hits, 0);
        assert_eq!(snap.counters.misses, 1);
        assert_eq!(upstream.requests(), 1);
    }

    #[tokio::test]
    async fn populator_warms_index_children() {
        let upstream = FakeUpstream::default();
        let base = spawn_upstream(upstream.clone()).await;

        upstream.set(
            "/api/actions",
            &format!(
                r#"<BESAPI><Action Resource="{b}/api/action/1"><Name>one</Name></Action><Action Resource="{b}/api/action/2"><Name>two</Name></Action></BESAPI>"#,
                b = base
            ),
        );
        upstream.set(
            "/api/computers",
            &format!(
                r#"<BESAPI><Computer Resource="{b}/api/computer/7"><ID>7</ID></Computer></BESAPI>"#,
                b = base
            ),
        );
        upstream.set(
            "/api/sites",
            &format!(
                concat!(
                    "<BESAPI>",
                    r#"<CustomSite Resource="{b}/api/site/custom/team"><Name>team</Name></CustomSite>"#,
                    r#"<ExternalSite Resource="{b}/api/site/external/patches"><Name>patches</Name></ExternalSite>"#,
                    r#"<OperatorSite Resource="{b}/api/site/operator/jdoe"><Name>jdoe</Name></OperatorSite>"#,
                    r#"<ActionSite Resource="{b}/api/site/actionsite"><Name>actionsite</Name></ActionSite>"#,
                    "</BESAPI>"
                ),
                b = base
            ),
        );

        let cache = Arc::new(Cache::new(CacheOptions::default()));
        cache
            .add_server(ServerConfig {
                url: base.clone(),
                username: "operator".to_string(),
                password: "secret".to_string(),
                pool_size: 2,
                max_age: 60,
                skip_tls_verify: false,
            })
            .unwrap();

        cache.populate_core_types(&base).await.unwrap();

        let expected: Vec<String> = [
            "/api/actions",
            "/api/computers",
            "/api/sites",
            "/api/action/1",
            "/api/action/1/status",
            "/api/action/2",
            "/api/action/2/status",
            "/api/computer/7",
            "/api/site/custom/team",
            "/api/site/custom/team/content",
            "/api/site/external/patches",
            "/api/site/external/patches/content",
            "/api/site/operator/jdoe",
            "/api/site/operator/jdoe/content",
            "/api/site/actionsite",
            "/api/site/actionsite/content",
        ]
        .iter()
        .map(|path| format!("{}{}", base, path))
        .collect();

        // Children are fire-and-forget; wait for them to land.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let missing = expected
                .iter()
                .filter(|url| cache.peek(url).is_none())
                .count();
            if missing == 0 {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "{} populated URLs still missing",
                missing
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // All fetches done: full pool capacity is back.
        let shard = shard_of(&cache, &base);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while shard.available_connections() != 2 {
            assert!(tokio::time::Instant::now() < deadline, "pool leaked");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn populator_requires_registered_shard() {
        let cache = Arc::new(Cache::new(CacheOptions::default()));
        let err = cache
            .populate_core_types("https://unknown.example.com:52311")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NoShardForUrl(_)));
    }

    #[tokio::test]
    async fn sweeper_task_tombstones_expired_entries() {
        let upstream = FakeUpstream::default();
        upstream.set("/api/computers", COMPUTERS_XML);
        let (cache, base) = cache_for(&upstream, 1, 600).await;

        let url = format!("{}/api/computers", base);
        cache.get(&url).await.unwrap();

        cache.start_sweeper(1);
        cache.start_sweeper(1); // second call is ignored

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(snap) = cache.peek(&url) {
                if snap.entry.is_tombstone() {
                    assert_eq!(snap.entry.content_hash, md5_hex(COMPUTERS_XML));
                    assert_eq!(snap.counters.misses, 1);
                    break;
                }
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "entry never tombstoned"
            );
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    #[test]
    fn canonical_base_url_strips_path_and_query() {
        assert_eq!(
            canonical_base_url("https://bes.example.com:52311/api/computers?count=10").unwrap(),
            "https://bes.example.com:52311"
        );
        assert_eq!(
            canonical_base_url("https://bes.example.com/api/computers").unwrap(),
            "https://bes.example.com"
        );
        assert_eq!(
            canonical_base_url("http://10.10.220.60:52311").unwrap(),
            "http://10.10.220.60:52311"
        );
    }

    #[test]
    fn canonical_base_url_rejects_garbage() {
        assert!(matches!(
            canonical_base_url("not a url"),
            Err(CoreError::InvalidUrl(_))
        ));
        assert!(matches!(
            canonical_base_url("mailto:admin@example.com"),
            Err(CoreError::InvalidUrl(_))
        ));
    }
}
