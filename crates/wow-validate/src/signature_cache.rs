//! Memoized signature verification outcomes (Section 4.6 of the design).
//!
//! Keyed by `(challenge_id, key_version)`; a lookup under a different key
//! version is always a miss — a cached rejection under key v1 must never
//! suppress a fresh check once the active key has rotated to v2.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

/// Default capacity of the memo.
pub const DEFAULT_CAPACITY: usize = 10_000;

pub struct SignatureCache {
    inner: Mutex<LruCache<(String, u32), bool>>,
}

impl SignatureCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up a memoized outcome for `(challenge_id, key_version)`. A
    /// lookup is never satisfied by an entry recorded under a different
    /// key version.
    pub fn get(&self, challenge_id: &str, key_version: u32) -> Option<bool> {
        let mut cache = self.inner.lock().expect("signature cache lock poisoned");
        cache.get(&(challenge_id.to_string(), key_version)).copied()
    }

    pub fn insert(&self, challenge_id: &str, key_version: u32, outcome: bool) {
        let mut cache = self.inner.lock().expect("signature cache lock poisoned");
        cache.put((challenge_id.to_string(), key_version), outcome);
    }
}

impl Default for SignatureCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_on_empty_cache() {
        let cache = SignatureCache::new(8);
        assert_eq!(cache.get("abc", 1), None);
    }

    #[test]
    fn test_hit_after_insert() {
        let cache = SignatureCache::new(8);
        cache.insert("abc", 1, true);
        assert_eq!(cache.get("abc", 1), Some(true));
    }

    #[test]
    fn test_different_key_version_is_always_a_miss() {
        let cache = SignatureCache::new(8);
        cache.insert("abc", 1, false);
        assert_eq!(cache.get("abc", 2), None);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let cache = SignatureCache::new(1);
        cache.insert("a", 1, true);
        cache.insert("b", 1, true);
        assert_eq!(cache.get("a", 1), None);
        assert_eq!(cache.get("b", 1), Some(true));
    }
}
