//! RequestOptimizer (C8): ties the request-fingerprint cache and the
//! concurrency limiter together behind the scheduler's optional fast path.
//! Both collaborators are individually toggled by `OptimizerConfig`.

use scheduler_common::config::OptimizerConfig;
use scheduler_common::utils::simple_hash;
use scheduler_common::{ExecutionResult, Payload, PipelineError};
use tokio::sync::OwnedSemaphorePermit;

use crate::cache::RequestCache;
use crate::concurrency::ConcurrencyLimiter;

pub struct RequestOptimizer {
    cache: Option<RequestCache>,
    limiter: Option<ConcurrencyLimiter>,
}

impl RequestOptimizer {
    pub fn new(config: &OptimizerConfig) -> Self {
        let cache = config.enable_caching.then(|| RequestCache::new(1024, config.cache_ttl));
        let limiter = config
            .enable_concurrency_limit
            .then(|| ConcurrencyLimiter::new(config.max_concurrency, config.queue_high_watermark));
        Self { cache, limiter }
    }

    /// A stable fingerprint of `(pipeline_id, payload)`, used both to look up
    /// and to store cached results.
    pub fn fingerprint(pipeline_id: &str, payload: &Payload) -> u64 {
        let mut bytes = Vec::with_capacity(pipeline_id.len() + payload.bytes.len());
        bytes.extend_from_slice(pipeline_id.as_bytes());
        bytes.extend_from_slice(&payload.bytes);
        simple_hash(&bytes)
    }

    pub fn lookup(&self, key: u64) -> Option<ExecutionResult> {
        self.cache.as_ref().and_then(|c| c.get(key))
    }

    pub fn store(&self, key: u64, result: &ExecutionResult) {
        use scheduler_common::ExecutionStatus;
        if result.status != ExecutionStatus::Completed {
            return;
        }
        if let Some(cache) = &self.cache {
            cache.insert(key, result.clone());
        }
    }

    /// Acquire a concurrency slot if the limiter is enabled; `Ok(None)` means
    /// the limiter is disabled and the caller may proceed unconditionally.
    pub async fn acquire_slot(&self) -> Result<Option<OwnedSemaphorePermit>, PipelineError> {
        match &self.limiter {
            Some(limiter) => limiter.acquire().await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_common::ExecutionStatus;
    use std::time::Duration;
    use uuid::Uuid;

    fn config(enable_caching: bool, enable_concurrency: bool) -> OptimizerConfig {
        OptimizerConfig {
            enable_caching,
            cache_ttl: Duration::from_secs(30),
            enable_concurrency_limit: enable_concurrency,
            max_concurrency: 1,
            queue_high_watermark: 0,
        }
    }

    fn completed() -> ExecutionResult {
        ExecutionResult {
            execution_id: Uuid::new_v4(),
            pipeline_id: "p1".into(),
            instance_id: None,
            status: ExecutionStatus::Completed,
            start_time: chrono::Utc::now(),
            end_time: chrono::Utc::now(),
            duration: Duration::from_millis(1),
            error: None,
            retry_count: 0,
            output: None,
        }
    }

    #[test]
    fn disabled_cache_never_stores() {
        let optimizer = RequestOptimizer::new(&config(false, false));
        let key = RequestOptimizer::fingerprint("p1", &Payload::new(vec![1]));
        optimizer.store(key, &completed());
        assert!(optimizer.lookup(key).is_none());
    }

    #[test]
    fn enabled_cache_roundtrips_a_completed_result() {
        let optimizer = RequestOptimizer::new(&config(true, false));
        let key = RequestOptimizer::fingerprint("p1", &Payload::new(vec![1]));
        optimizer.store(key, &completed());
        assert!(optimizer.lookup(key).is_some());
    }

    #[tokio::test]
    async fn disabled_limiter_always_grants_access() {
        let optimizer = RequestOptimizer::new(&config(false, false));
        assert!(optimizer.acquire_slot().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enabled_limiter_rejects_past_capacity() {
        let optimizer = RequestOptimizer::new(&config(false, true));
        let _held = optimizer.acquire_slot().await.unwrap();
        assert!(optimizer.acquire_slot().await.is_err());
    }
}
