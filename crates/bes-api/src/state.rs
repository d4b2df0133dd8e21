//! Application state

use bes_core::Cache;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<Cache>,
}

impl AppState {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }
}
