//! Shared keyed store for short-lived state.
//!
//! Rate-limit counters and CSRF tokens live behind [`EphemeralStore`] so
//! several service instances can point at one backend. [`InMemoryStore`] is
//! the single-instance implementation.

use crate::errors::{PolicyError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Counter count above which expired counters are swept
const COUNTER_SWEEP_THRESHOLD: usize = 10_000;

/// Default cap on stored values
pub const MAX_VALUES: usize = 10_000;

/// Fixed-window counter snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    pub count: u32,
    pub window_start: u64,
    pub window_seconds: u64,
}

impl Counter {
    pub fn reset_at(&self) -> u64 {
        self.window_start + self.window_seconds
    }
}

/// Keyed store with per-entry expiry
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Add one to the counter for `key`, opening a new window if the current
    /// one has closed. Returns the counter after the increment.
    async fn increment(&self, key: &str, window_seconds: u64, now: u64) -> Result<Counter>;

    /// Read the live counter for `key` without changing it
    async fn counter(&self, key: &str, now: u64) -> Result<Option<Counter>>;

    /// Store a value that disappears after `ttl_seconds`.
    ///
    /// Fails with [`PolicyError::StoreFull`] rather than displacing live
    /// state when the store is at capacity.
    async fn set(&self, key: &str, value: String, ttl_seconds: u64, now: u64) -> Result<()>;

    /// Read a live value
    async fn get(&self, key: &str, now: u64) -> Result<Option<String>>;

    /// Remove a key of either kind
    async fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: u64,
}

/// In-process [`EphemeralStore`]
///
/// Counters and values are kept apart. A live counter is never evicted;
/// expired ones are swept once the map grows past a threshold. Values are
/// capped and a full value map refuses new keys.
pub struct InMemoryStore {
    counters: Mutex<HashMap<String, Counter>>,
    values: Mutex<HashMap<String, StoredValue>>,
    max_values: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_value_capacity(MAX_VALUES)
    }

    pub fn with_value_capacity(max_values: usize) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            values: Mutex::new(HashMap::new()),
            max_values,
        }
    }

    fn counters(&self) -> MutexGuard<'_, HashMap<String, Counter>> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, StoredValue>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    fn value_count(&self) -> usize {
        self.values().len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EphemeralStore for InMemoryStore {
    async fn increment(&self, key: &str, window_seconds: u64, now: u64) -> Result<Counter> {
        let mut counters = self.counters();
        if counters.len() >= COUNTER_SWEEP_THRESHOLD && !counters.contains_key(key) {
            counters.retain(|_, c| c.reset_at() > now);
        }

        let counter = counters.entry(key.to_string()).or_insert(Counter {
            count: 0,
            window_start: now,
            window_seconds,
        });
        if counter.reset_at() <= now {
            *counter = Counter {
                count: 0,
                window_start: now,
                window_seconds,
            };
        }
        counter.count = counter.count.saturating_add(1);
        Ok(*counter)
    }

    async fn counter(&self, key: &str, now: u64) -> Result<Option<Counter>> {
        Ok(self
            .counters()
            .get(key)
            .filter(|c| c.reset_at() > now)
            .copied())
    }

    async fn set(&self, key: &str, value: String, ttl_seconds: u64, now: u64) -> Result<()> {
        let mut values = self.values();
        if values.len() >= self.max_values && !values.contains_key(key) {
            values.retain(|_, v| v.expires_at > now);
            if values.len() >= self.max_values {
                return Err(PolicyError::StoreFull("value capacity reached"));
            }
        }
        values.insert(
            key.to_string(),
            StoredValue {
                value,
                expires_at: now + ttl_seconds,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str, now: u64) -> Result<Option<String>> {
        let mut values = self.values();
        match values.get(key) {
            Some(stored) if stored.expires_at > now => Ok(Some(stored.value.clone())),
            Some(_) => {
                values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.counters().remove(key);
        self.values().remove(key);
        Ok(())
    }
}
