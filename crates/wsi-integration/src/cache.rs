//! Time-bounded in-memory cache for metadata lookups.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// How long device and workspace lookups stay cached.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// Keyed cache whose entries expire after a fixed lifetime.
pub struct Cache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> Cache<V> {
    /// Create a cache with the given entry lifetime.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh value for `key`, if any. Expired entries are dropped.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `value` under `key`.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.lock().insert(
            key.into(),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Cached value for `key`, or the result of `load` which is then cached.
    ///
    /// Failed loads are not cached.
    ///
    /// # Errors
    ///
    /// Returns the error of `load`.
    pub async fn fetch<F, Fut, E>(&self, key: &str, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            tracing::debug!(key, "Cache hit");
            return Ok(value);
        }

        let value = load().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Number of stored entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<V: Clone> Default for Cache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
