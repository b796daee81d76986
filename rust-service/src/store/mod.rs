//! Key-value storage shared by the status and bounce records.
//!
//! Components receive an `Arc<dyn KvStore>` rather than reaching for a
//! global, so tests can run against `MemoryStore` while production talks to
//! Redis.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store command error: {0}")]
    Command(String),

    #[error("stored value is corrupt: {0}")]
    Corrupt(String),
}

/// String-keyed store with per-entry expiry.
///
/// Implementations must be safe to call from any task concurrently, and
/// `set_if_absent` must be atomic: of several racing callers for the same
/// key, exactly one observes `true`.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value`, replacing any previous entry.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Write `value` only if `key` holds nothing. Returns whether it wrote.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;
}
