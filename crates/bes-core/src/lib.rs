//! BES Cache Core Business Logic
//!
//! This crate provides the caching engine for BES Cache: the per-upstream
//! server shards with bounded connection pools, the two-level cache with
//! content-hash based TTL extension, the core-type populator and the
//! tombstoning sweeper.

pub mod cache;
pub mod entry;
pub mod error;
pub mod fetch;
pub mod populate;
pub mod shard;
pub mod sweeper;
pub mod xml;

pub use cache::{Cache, CacheOptions, ServerConfig};
pub use entry::{CacheEntry, CounterSnapshot, EntrySnapshot};
pub use error::CoreError;
pub use shard::ServerShard;
