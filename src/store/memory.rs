//! In-process counter store.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use super::{CounterStore, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// A [`CounterStore`] held in process memory.
///
/// Entries expire by TTL exactly like the Redis store: an expired entry
/// reads as absent and is dropped lazily or by [`MemoryStore::purge_expired`].
/// Expiry is measured on the tokio clock, so paused-time tests can advance it.
///
/// State is local to one process, so this store only enforces limits for a
/// single instance of the service.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time-to-live of the entry at `key`, if it is live.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at - now)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            trace!(removed, "Purged expired store entries");
        }
        removed
    }

    /// Number of entries currently held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;

        if entry.is_expired(now) {
            // The read guard must be released before removing from the same shard.
            drop(entry);
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
            return None;
        }

        Some(entry.value.clone())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get_count(&self, key: &str) -> Result<Option<u64>, StoreError> {
        match self.live_value(key) {
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| StoreError::InvalidValue {
                    key: key.to_string(),
                    value,
                }),
            None => Ok(None),
        }
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();

        // The entry guard holds the shard lock for the whole read-modify-write.
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                value: String::new(),
                expires_at: now,
            });

        let current = if entry.is_expired(now) {
            0
        } else {
            entry
                .value
                .parse::<u64>()
                .map_err(|_| StoreError::InvalidValue {
                    key: key.to_string(),
                    value: entry.value.clone(),
                })?
        };

        let next = current + 1;
        entry.value = next.to_string();
        entry.expires_at = now + ttl;
        Ok(next)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.live_value(key).is_some())
    }
}
