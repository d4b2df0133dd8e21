//! The `/urls` hot path
//!
//! Clients hand the proxy a full upstream URL and get back the cached JSON
//! plus the entry's cache metadata. Whether the request is a cache hit is
//! decided with a pure read *before* the lookup runs, so the flag reports
//! the state the request actually found rather than the state it produced.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UrlsQuery {
    url: Option<String>,
}

#[derive(Deserialize)]
pub struct UrlsBody {
    url: String,
}

/// Cache lookup response for one URL
#[derive(Serialize)]
pub struct UrlsResponse {
    pub cacheitem: Value,
    pub iscachehit: bool,
    pub timestamp: i64,
    pub maxage: u64,
    pub ttl: i64,
    pub hitcount: u64,
    pub misscount: u64,
    pub contenthash: String,
}

/// GET form: the URL comes from the query string
async fn urls_get(
    State(state): State<AppState>,
    Query(query): Query<UrlsQuery>,
) -> Result<Json<UrlsResponse>, ApiError> {
    let url = query
        .url
        .ok_or_else(|| ApiError::BadRequest("url parameter is required".to_string()))?;
    lookup(&state, &url).await
}

/// POST form: the URL comes from a JSON body
async fn urls_post(
    State(state): State<AppState>,
    Json(body): Json<UrlsBody>,
) -> Result<Json<UrlsResponse>, ApiError> {
    lookup(&state, &body.url).await
}

async fn lookup(state: &AppState, url: &str) -> Result<Json<UrlsResponse>, ApiError> {
    if url.is_empty() {
        return Err(ApiError::BadRequest("url parameter is required".to_string()));
    }

    // Pure read: would this request be served from memory?
    let now = Utc::now().timestamp();
    let iscachehit = state
        .cache
        .peek(url)
        .map(|snap| snap.is_servable(now))
        .unwrap_or(false);

    debug!("Cache request for {} (will be hit: {})", url, iscachehit);
    let snapshot = state.cache.get(url).await?;
    let entry = &snapshot.entry;

    // Declared-JSON bodies are embedded as JSON values so clients do not
    // see double-encoded strings; converted XML stays a JSON string.
    let cacheitem = if url.contains("output=json") || url.contains("format=json") {
        serde_json::from_str(&entry.json)
            .unwrap_or_else(|_| Value::String(entry.json.clone()))
    } else {
        Value::String(entry.json.clone())
    };

    let now = Utc::now().timestamp();
    Ok(Json(UrlsResponse {
        cacheitem,
        iscachehit,
        timestamp: entry.timestamp,
        maxage: entry.max_age,
        ttl: entry.ttl(now),
        hitcount: snapshot.counters.hits,
        misscount: snapshot.counters.misses,
        contenthash: entry.content_hash.clone(),
    }))
}

/// Create the /urls routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/urls", get(urls_get))
        .route("/urls", post(urls_post))
}
