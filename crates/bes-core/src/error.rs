//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("no server shard registered for {0}")]
    NoShardForUrl(String),

    #[error("server shard {0} already exists")]
    ShardExists(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("upstream error: {0}")]
    Proxy(#[from] bes_proxy::ProxyError),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}
