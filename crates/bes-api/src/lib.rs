//! BES Cache HTTP API
//!
//! This crate provides the JSON front-end over the caching engine: the
//! `/urls` hot path plus the operator views of registered servers and
//! cache contents.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
