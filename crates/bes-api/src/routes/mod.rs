//! API routes

mod health;
mod servers;
mod urls;

use axum::Router;

use crate::state::AppState;

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(urls::routes())
        .merge(servers::routes())
        .with_state(state)
}
