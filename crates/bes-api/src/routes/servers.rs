//! Operator views of registered servers and cache contents
//!
//! All three endpoints are read-only: they walk shard snapshots and never
//! touch counters or trigger fetches.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::state::AppState;

/// Memory footprint of one shard
#[derive(Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub ram_bytes: u64,
    pub ram_kb: f64,
    pub ram_mb: f64,
}

/// Per-shard resident memory
async fn servers(State(state): State<AppState>) -> Json<Value> {
    let mut servers: Vec<ServerInfo> = state
        .cache
        .shards()
        .iter()
        .map(|shard| {
            let ram_bytes = shard.memory_bytes();
            ServerInfo {
                name: shard.base_url().to_string(),
                ram_bytes,
                ram_kb: ram_bytes as f64 / 1024.0,
                ram_mb: ram_bytes as f64 / (1024.0 * 1024.0),
            }
        })
        .collect();
    servers.sort_by(|a, b| a.name.cmp(&b.name));

    let count = servers.len();
    Json(json!({
        "servers": servers,
        "number_of_servers": count,
    }))
}

/// Per-shard entry counts and memory, with totals across shards
async fn summary(State(state): State<AppState>) -> Json<Value> {
    let now = Utc::now().timestamp();
    let mut body = serde_json::Map::new();
    let mut total_bytes: u64 = 0;

    for shard in state.cache.shards() {
        let mut current = 0usize;
        let mut expired = 0usize;
        let mut ram_bytes: u64 = 0;

        for (_, snapshot) in shard.snapshot_entries() {
            ram_bytes += snapshot.entry.json.len() as u64;
            if snapshot.entry.is_expired(now) {
                expired += 1;
            } else {
                current += 1;
            }
        }

        total_bytes += ram_bytes;
        body.insert(
            shard.base_url().to_string(),
            json!({
                "total_items": current + expired,
                "current_items": current,
                "expired_items": expired,
                "ram_bytes": ram_bytes,
                "ram_kb": ram_bytes as f64 / 1024.0,
                "ram_mb": ram_bytes as f64 / (1024.0 * 1024.0),
            }),
        );
    }

    body.insert("total_ram_bytes".to_string(), json!(total_bytes));
    body.insert("total_ram_kb".to_string(), json!(total_bytes as f64 / 1024.0));
    body.insert(
        "total_ram_mb".to_string(),
        json!(total_bytes as f64 / (1024.0 * 1024.0)),
    );

    Json(Value::Object(body))
}

/// Cached request URLs per shard
async fn cache_contents(State(state): State<AppState>) -> Json<Value> {
    let mut contents = BTreeMap::new();

    for shard in state.cache.shards() {
        let mut urls: Vec<String> = shard
            .snapshot_entries()
            .into_iter()
            .map(|(url, _)| url)
            .collect();
        urls.sort();
        contents.insert(shard.base_url().to_string(), urls);
    }

    Json(json!(contents))
}

/// Create the operator routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/servers", get(servers))
        .route("/summary", get(summary))
        .route("/cache", get(cache_contents))
}
