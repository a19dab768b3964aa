//! Shared counter store abstraction.
//!
//! The limiter engine keeps no per-key state of its own. Everything it knows
//! about a caller lives in a store offering four primitives: read a counter,
//! increment-and-expire as one indivisible unit, write a value with an
//! expiry, and test a key for existence.

mod memory;
mod redis;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

/// Errors raised by a [`CounterStore`].
///
/// A missing key is not an error; reads report it as `None` or `false`.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport or protocol failure talking to the backend
    #[error("Backend error: {0}")]
    Backend(#[from] ::redis::RedisError),

    /// The stored value cannot be read as a counter
    #[error("Value at key '{key}' is not a counter: {value}")]
    InvalidValue { key: String, value: String },

    /// The operation did not complete within its deadline
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Trait for counter store implementations.
///
/// Implementations must be safe to share across request-handling tasks;
/// the limiter holds a single `Arc<dyn CounterStore>`.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the counter at `key`. Returns `Ok(None)` when the key is absent.
    async fn get_count(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Increment the counter at `key` by one and set its expiry to `ttl`,
    /// as one indivisible operation. Returns the new value.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    /// Write `value` at `key`, replacing any previous value and expiry.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Whether a live value exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
}
