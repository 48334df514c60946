//! Request-fingerprint cache (C8, first half). Grounded on the source's
//! `ModelCache`'s `lru::LruCache`-backed access pattern, stripped of its
//! predictive preloading and memory-pressure machinery down to a plain
//! bounded LRU keyed by a request fingerprint, with a per-entry TTL.

use std::num::NonZeroUsize;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use scheduler_common::ExecutionResult;

struct CachedResult {
    result: ExecutionResult,
    cached_at: DateTime<Utc>,
}

/// Bounded, TTL-expiring cache from request fingerprint to a prior
/// `ExecutionResult`. Only `Completed` results are ever stored; a cached
/// failure would otherwise keep returning a stale error past its cause.
pub struct RequestCache {
    entries: Mutex<LruCache<u64, CachedResult>>,
    ttl: Duration,
}

impl RequestCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self { entries: Mutex::new(LruCache::new(capacity)), ttl }
    }

    pub fn get(&self, key: u64) -> Option<ExecutionResult> {
        let mut entries = self.entries.lock();
        let expired = match entries.peek(&key) {
            Some(cached) => Utc::now().signed_duration_since(cached.cached_at) > chrono_ttl(self.ttl),
            None => return None,
        };
        if expired {
            entries.pop(&key);
            return None;
        }
        entries.get(&key).map(|cached| cached.result.clone())
    }

    pub fn insert(&self, key: u64, result: ExecutionResult) {
        self.entries.lock().put(key, CachedResult { result, cached_at: Utc::now() });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

fn chrono_ttl(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::milliseconds(i64::MAX / 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc as ChronoUtc;
    use scheduler_common::{ExecutionStatus, Payload};
    use uuid::Uuid;

    fn completed(pipeline_id: &str) -> ExecutionResult {
        ExecutionResult {
            execution_id: Uuid::new_v4(),
            pipeline_id: pipeline_id.to_string(),
            instance_id: None,
            status: ExecutionStatus::Completed,
            start_time: ChronoUtc::now(),
            end_time: ChronoUtc::now(),
            duration: Duration::from_millis(5),
            error: None,
            retry_count: 0,
            output: Some(Payload::new(vec![1, 2, 3])),
        }
    }

    #[test]
    fn stores_and_returns_a_hit() {
        let cache = RequestCache::new(8, Duration::from_secs(60));
        cache.insert(1, completed("p1"));
        let hit = cache.get(1).unwrap();
        assert_eq!(hit.pipeline_id, "p1");
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let cache = RequestCache::new(8, Duration::from_millis(0));
        cache.insert(1, completed("p1"));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(cache.get(1).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn eviction_respects_lru_capacity() {
        let cache = RequestCache::new(1, Duration::from_secs(60));
        cache.insert(1, completed("p1"));
        cache.insert(2, completed("p2"));
        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_some());
    }
}
