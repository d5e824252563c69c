//! Keyed store abstraction.
//!
//! The keyed store is the only shared mutable resource the pipeline relies on
//! for correctness. Every operation on a single key is atomic; nothing relies
//! on transactions across operations. Deduplication (`set_if_absent`), the
//! reconciliation queues (list push/trim/remove), and short-lived attribution
//! caches are all built on this interface.
//!
//! - [`memory::MemoryKeyedStore`]: single-process implementation used in tests
//!   and for single-node deployments.

pub mod keys;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use memory::MemoryKeyedStore;

/// Errors from keyed store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A list operation was attempted on a string key, or vice versa.
    #[error("wrong value type for key {0}")]
    WrongType(String),

    /// `incr` on a value that is not an integer.
    #[error("value at key {0} is not an integer")]
    NotAnInteger(String),

    /// JSON (de)serialization of a cached value failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backing store is unavailable.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Atomic keyed-store primitives.
///
/// Lists are ordered most-recent-first: `push_front` prepends, `list_recent`
/// reads from the front, and `trim` keeps the first `max_len` entries.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Reads a string value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes a string value, replacing any existing value and TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Writes a string value only if the key does not exist.
    ///
    /// Returns `true` if this call created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool>;

    /// Deletes a key of any type. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Prepends to a list, creating it if needed. Returns the new length.
    async fn push_front(&self, key: &str, value: &str) -> Result<usize>;

    /// Keeps the first `max_len` entries of a list. Returns how many were dropped.
    async fn trim(&self, key: &str, max_len: usize) -> Result<usize>;

    /// Removes the first (most recent) occurrence of `value` from a list.
    ///
    /// Returns `true` if an element was removed. Two concurrent callers
    /// removing the same value never both succeed.
    async fn remove_first(&self, key: &str, value: &str) -> Result<bool>;

    /// Reads up to `limit` entries from the front of a list.
    async fn list_recent(&self, key: &str, limit: usize) -> Result<Vec<String>>;

    /// Sets a TTL on an existing key. Returns `false` if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Atomically increments an integer value (missing keys start at 0).
    async fn incr(&self, key: &str) -> Result<i64>;
}

/// Reads and deserializes a JSON value.
pub async fn get_json<T: DeserializeOwned>(store: &dyn KeyedStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serializes and writes a JSON value.
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn KeyedStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw, ttl).await
}
