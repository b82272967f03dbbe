//! LRU cache of enforcement decisions

use blake3::Hasher;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::num::NonZeroUsize;

use super::decision::EnforceContext;

/// Cache key for enforcement requests
pub type CacheKey = [u8; 32]; // BLAKE3 hash

/// What the cache remembers about a decision
#[derive(Debug, Clone, PartialEq)]
pub struct CachedVerdict {
    pub allowed: bool,
    pub rule: Option<Vec<String>>,
    pub rule_index: Option<usize>,
}

/// Decision cache
///
/// Entries are only valid for the policy state they were computed against;
/// the enforcer clears the cache on every mutation.
pub struct DecisionCache {
    entries: Mutex<LruCache<CacheKey, CachedVerdict>>,
}

impl DecisionCache {
    /// Create a cache holding at most `capacity` decisions
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Compute the cache key for a request evaluated under `ctx` with `matcher`
    pub fn key(ctx: &EnforceContext, matcher: &str, request: &[Value]) -> CacheKey {
        let mut hasher = Hasher::new();
        for part in [&ctx.r, &ctx.p, &ctx.e, &ctx.m] {
            update_framed(&mut hasher, part.as_bytes());
        }
        update_framed(&mut hasher, matcher.as_bytes());

        // JSON text keeps "1" and 1 apart; object keys serialize sorted
        for value in request {
            update_framed(&mut hasher, value.to_string().as_bytes());
        }

        *hasher.finalize().as_bytes()
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedVerdict> {
        self.entries.lock().get(key).cloned()
    }

    pub fn put(&self, key: CacheKey, verdict: CachedVerdict) {
        self.entries.lock().put(key, verdict);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Length-prefix each part so ("ab", "c") and ("a", "bc") hash differently
fn update_framed(hasher: &mut Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
