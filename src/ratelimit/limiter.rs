//! Core rate limiter implementation.
//!
//! Each identity owns two independent records in the shared store:
//!
//! - a counter at `<key>` holding the number of admitted requests in the
//!   current window, with a TTL refreshed on every admit;
//! - a block marker at `block:<key>`, written once the counter reaches the
//!   limit and left to expire on its own TTL.
//!
//! The counter is only incremented on admit, so it freezes at the value
//! that triggered the block. Store failures are resolved by policy and
//! never surfaced to the caller: [`RateLimiter::is_blocked`] fails open,
//! [`RateLimiter::allow`] fails closed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

use crate::store::{CounterStore, StoreError};

const BLOCK_PREFIX: &str = "block:";
const BLOCK_VALUE: &str = "blocked";

/// Store key of the block marker for `key`.
pub fn block_key(key: &str) -> String {
    format!("{}{}", BLOCK_PREFIX, key)
}

/// The limiter engine.
///
/// Holds no per-key state; all coordination between concurrent requests
/// goes through the store's atomic increment. Cheap to share behind an `Arc`.
pub struct RateLimiter {
    /// Shared counter store handle
    store: Arc<dyn CounterStore>,
    /// Deadline applied to each store round trip
    operation_timeout: Option<Duration>,
}

impl RateLimiter {
    /// Create a rate limiter over `store` with no per-operation deadline.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            operation_timeout: None,
        }
    }

    /// Create a rate limiter whose store calls give up after `timeout`.
    ///
    /// A timed-out call is handled like any other store failure.
    pub fn with_operation_timeout(store: Arc<dyn CounterStore>, timeout: Duration) -> Self {
        Self {
            store,
            operation_timeout: Some(timeout),
        }
    }

    /// Whether a live block marker exists for `key`.
    ///
    /// Store failures are logged and reported as not blocked, favoring
    /// availability; [`RateLimiter::allow`] still guards the request.
    pub async fn is_blocked(&self, key: &str) -> bool {
        match self.bounded(self.store.exists(&block_key(key))).await {
            Ok(blocked) => {
                if blocked {
                    debug!(key = %key, "Key is blocked");
                }
                blocked
            }
            Err(e) => {
                warn!(
                    key = %key,
                    error = %e,
                    "Block lookup failed, treating key as not blocked"
                );
                false
            }
        }
    }

    /// Decide whether one more request for `key` is admitted.
    ///
    /// Admits while the window's counter is below `limit`, refreshing the
    /// counter's TTL to `block_duration` on every admit. At or over the limit
    /// the key is blocked for `block_duration` and the counter is left as is.
    /// Store failures reject the request.
    pub async fn allow(&self, key: &str, limit: u64, block_duration: Duration) -> bool {
        let current = match self.bounded(self.store.get_count(key)).await {
            Ok(current) => current,
            Err(e) => {
                error!(key = %key, error = %e, "Failed to read counter, rejecting request");
                return false;
            }
        };

        match current {
            Some(current) if current >= limit => {
                self.block(key, current, limit, block_duration).await;
                false
            }
            _ => self.admit(key, block_duration).await,
        }
    }

    /// Increment the counter and refresh its TTL in one atomic step.
    async fn admit(&self, key: &str, ttl: Duration) -> bool {
        match self.bounded(self.store.incr_with_ttl(key, ttl)).await {
            Ok(count) => {
                trace!(key = %key, count, "Request admitted");
                true
            }
            Err(e) => {
                error!(key = %key, error = %e, "Failed to increment counter, rejecting request");
                false
            }
        }
    }

    async fn block(&self, key: &str, current: u64, limit: u64, block_duration: Duration) {
        debug!(
            key = %key,
            count = current,
            limit,
            block_secs = block_duration.as_secs(),
            "Rate limit exceeded, blocking key"
        );

        let result = self
            .bounded(self.store.set_with_ttl(&block_key(key), BLOCK_VALUE, block_duration))
            .await;

        if let Err(e) = result {
            warn!(key = %key, error = %e, "Failed to write block marker");
        }
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match self.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, op)
                .await
                .map_err(|_| StoreError::Timeout(limit))?,
            None => op.await,
        }
    }
}
