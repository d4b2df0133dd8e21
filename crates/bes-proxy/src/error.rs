//! Proxy error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned error: {status} - {message}")]
    Upstream { status: u16, message: String },

    #[error("Connection pool is closed")]
    PoolClosed,
}
