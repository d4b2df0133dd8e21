//! Core-type populator
//!
//! Pre-warms a shard with the endpoints clients hit first: the action,
//! computer and site indexes, plus every resource they reference. Index
//! fetches run in order and their failures surface to the caller; child
//! fetches are fire-and-forget background tasks whose errors are only
//! logged, since the populator's one job is warming the cache.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::cache::{canonical_base_url, Cache};
use crate::error::CoreError;

pub(crate) async fn run(cache: &Arc<Cache>, server_url: &str) -> Result<(), CoreError> {
    let base_url = canonical_base_url(server_url)?;

    let actions = fetch_listing(cache, &base_url, "/api/actions").await?;
    for action in items(&actions["Action"]) {
        if let Some(resource) = resource_of(action) {
            spawn_silent_get(cache, resource.to_string());
            spawn_silent_get(cache, format!("{}/status", resource));
        }
    }

    let computers = fetch_listing(cache, &base_url, "/api/computers").await?;
    for computer in items(&computers["Computer"]) {
        if let Some(resource) = resource_of(computer) {
            spawn_silent_get(cache, resource.to_string());
        }
    }

    let sites = fetch_listing(cache, &base_url, "/api/sites").await?;
    for kind in ["CustomSite", "ExternalSite", "OperatorSite"] {
        for site in items(&sites[kind]) {
            if let Some(resource) = resource_of(site) {
                spawn_silent_get(cache, resource.to_string());
                spawn_silent_get(cache, format!("{}/content", resource));
            }
        }
    }
    if let Some(resource) = resource_of(&sites["ActionSite"]) {
        spawn_silent_get(cache, resource.to_string());
        spawn_silent_get(cache, format!("{}/content", resource));
    }

    Ok(())
}

/// Get one index endpoint through the cache and parse its JSON listing
async fn fetch_listing(cache: &Arc<Cache>, base_url: &str, path: &str) -> Result<Value, CoreError> {
    let index_url = format!("{}{}", base_url, path);
    let snapshot = cache.get(&index_url).await?;

    serde_json::from_str(&snapshot.entry.json)
        .map_err(|e| CoreError::Parse(format!("index listing {}: {}", index_url, e)))
}

/// View a listing field as a slice of items: the XML transform collapses a
/// single child element to an object, many to an array, none to nothing.
fn items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(values) => values.iter().collect(),
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

fn resource_of(value: &Value) -> Option<&str> {
    value["Resource"].as_str()
}

/// Fetch a child URL in the background, swallowing errors.
fn spawn_silent_get(cache: &Arc<Cache>, url: String) {
    let cache = cache.clone();
    tokio::spawn(async move {
        if let Err(e) = cache.get(&url).await {
            debug!("Populator fetch for {} failed: {}", url, e);
        }
    });
}
