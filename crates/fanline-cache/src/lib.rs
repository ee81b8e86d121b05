//! Fanline Cache Contract
//!
//! This crate defines the key/value cache interface the follower-list
//! cache is built on, plus an in-process implementation for tests and
//! single-node deployments.
//!
//! ## What Does the Cache Hold?
//!
//! Two kinds of entries, both carrying the same TTL:
//!
//! | Key | Value | Purpose |
//! |-----|-------|---------|
//! | `followers:index:{owner}` | ordered list of follower IDs | one range-readable index per owner, newest first |
//! | `user:{id}` | JSON snapshot bytes | one small record per user, shared across every list that user appears in |
//!
//! The naive comparator additionally writes `followers:{owner}:{page}:{size}`
//! pages, which is exactly the layout the index/snapshot split replaces.
//!
//! ## Why a Trait?
//!
//! The cache is an external collaborator: production points this contract
//! at a networked cache, tests point it at [`MemoryCache`]. Services only
//! depend on the operations below, so the two are interchangeable.
//!
//! ## Atomicity
//!
//! [`KvCache::pipeline`] executes its operations as one atomic batch with
//! respect to other callers. Index refreshes rely on this: a reader must
//! never observe the window between `DEL` and the re-append, or it would
//! treat a half-written prefix as the full follower list.

pub mod error;
pub mod memory;

pub use error::{CacheError, Result};
pub use memory::MemoryCache;

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// A single operation inside a [`KvCache::pipeline`] batch.
#[derive(Debug, Clone)]
pub enum CacheOp {
    Set {
        key: String,
        value: Bytes,
        ttl: Duration,
    },
    Del {
        key: String,
    },
    RPush {
        key: String,
        values: Vec<String>,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
}

/// Result of one pipelined operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheReply {
    Ok,
    /// Number of elements in the list after an `RPush`.
    Len(u64),
}

/// Bytes-valued cache with TTLs and ordered lists.
///
/// All implementations must be `Send + Sync`; services share them via
/// `Arc<dyn KvCache>`.
#[async_trait]
pub trait KvCache: Send + Sync {
    /// Fetch the bytes stored at `key`, if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store bytes at `key` with a time-to-live.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Whether a live entry exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn del(&self, key: &str) -> Result<()>;

    /// Append values to the list at `key`, creating it if missing.
    /// Returns the resulting list length.
    async fn rpush(&self, key: &str, values: &[String]) -> Result<u64>;

    /// Inclusive range read over the list at `key`.
    ///
    /// Follows list-range conventions: `start`/`end` are zero-based,
    /// both ends inclusive, and negative indices count from the tail
    /// (`-1` is the last element). Out-of-range requests clamp; a missing
    /// key yields an empty vec.
    async fn lrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<String>>;

    /// Reset the TTL on an existing key. No-op when the key is missing.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Fetch many keys at once, preserving request order. Missing or
    /// expired keys yield `None`; list keys also yield `None`.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>>;

    /// Execute a batch of operations atomically with respect to other
    /// callers, returning one reply per operation.
    async fn pipeline(&self, ops: Vec<CacheOp>) -> Result<Vec<CacheReply>>;

    /// Drop every entry.
    async fn flush_all(&self) -> Result<()>;

    /// Human-readable memory usage summary.
    async fn info_memory(&self) -> Result<String>;
}
