//! BES Cache Upstream Proxy
//!
//! This crate provides the client for communicating with upstream BES
//! management servers, handling Basic authentication and bounded
//! connection pooling.

pub mod client;
pub mod error;
pub mod pool;

pub use client::{BesConnection, BesConnectionConfig};
pub use error::ProxyError;
pub use pool::ConnectionPool;
