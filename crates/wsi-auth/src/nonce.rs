//! Replay protection for signed credentials.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Set of seen token ids (`jti`).
///
/// Each id is kept until the end of its credential's validity window. After
/// that the freshness check rejects the credential on its own, so the entry
/// can be pruned without reopening a replay window.
#[derive(Debug, Default)]
pub struct NonceCache {
    seen: HashMap<String, DateTime<Utc>>,
}

impl NonceCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `jti` unless it was seen before.
    ///
    /// Returns `false` for a replay. Expired entries are pruned first.
    pub fn check_and_record(
        &mut self,
        jti: &str,
        keep_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        self.prune(now);
        if self.seen.contains_key(jti) {
            return false;
        }
        self.seen.insert(jti.to_string(), keep_until);
        true
    }

    /// Drop entries whose validity window ended before `now`.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        self.seen.retain(|_, keep_until| *keep_until >= now);
    }

    /// Number of remembered ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no ids are remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn second_use_is_rejected() {
        let mut cache = NonceCache::new();
        let now = Utc::now();
        let until = now + Duration::minutes(5);

        assert!(cache.check_and_record("a", until, now));
        assert!(!cache.check_and_record("a", until, now));
        assert!(cache.check_and_record("b", until, now));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn entries_are_pruned_after_their_window() {
        let mut cache = NonceCache::new();
        let now = Utc::now();
        cache.check_and_record("a", now + Duration::minutes(5), now);
        cache.check_and_record("b", now + Duration::hours(1), now);

        cache.prune(now + Duration::minutes(10));

        assert_eq!(cache.len(), 1);
        let later = now + Duration::minutes(10);
        assert!(cache.check_and_record("a", later + Duration::minutes(5), later));
    }
}
