//! Upstream fetch and transform
//!
//! Turns one upstream GET into a fresh [`CacheEntry`]: acquire a pooled
//! connection, fetch the raw bytes, detect the body format, transform XML
//! to JSON (or pass declared JSON through verbatim), and hash the raw
//! bytes for change detection. The connection returns to its pool on every
//! exit path, success or failure.

use bes_proxy::BesConnection;
use bytes::Bytes;
use chrono::Utc;
use md5::{Digest, Md5};
use serde_json::Value;

use crate::entry::CacheEntry;
use crate::error::CoreError;
use crate::shard::ServerShard;
use crate::xml::{self, Schema};

/// Whether the request declares its response body to be JSON already.
///
/// Upstream query endpoints can emit JSON directly when asked; such bodies
/// are cached verbatim instead of being run through the XML transform.
pub(crate) fn is_json_passthrough(url: &str) -> bool {
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    };

    path.contains("/api/query") && (query.contains("output=json") || query.contains("format=json"))
}

/// Fetch `url` through the shard's pool and build a fresh entry carrying
/// `timestamp = now` and the shard's base TTL.
pub(crate) async fn fetch_entry(shard: &ServerShard, url: &str) -> Result<CacheEntry, CoreError> {
    let conn = shard.pool().acquire().await.map_err(CoreError::Proxy)?;
    let result = fetch_with(&conn, url, shard.base_max_age()).await;
    shard.pool().release(conn);
    result
}

async fn fetch_with(
    conn: &BesConnection,
    url: &str,
    base_max_age: u64,
) -> Result<CacheEntry, CoreError> {
    let raw = conn.get(url).await.map_err(CoreError::Proxy)?;

    // The hash covers the raw upstream bytes, pre-transform, so drift in
    // the transform never looks like a content change.
    let content_hash = hex::encode(Md5::digest(&raw));
    let json = transform_body(url, &raw)?;

    Ok(CacheEntry::fresh(
        json,
        content_hash,
        base_max_age,
        Utc::now().timestamp(),
    ))
}

fn transform_body(url: &str, raw: &Bytes) -> Result<String, CoreError> {
    let body = String::from_utf8_lossy(raw);

    if is_json_passthrough(url) {
        // The body was declared JSON; reject garbage but store verbatim.
        serde_json::from_str::<Value>(&body)
            .map_err(|e| CoreError::Parse(format!("declared-JSON body: {}", e)))?;
        return Ok(body.into_owned());
    }

    xml::transform(&body, Schema::detect(&body))
}
