//! Rolling per-pipeline health tracking (HealthTracker, C1).
//!
//! One [`HealthSnapshot`] per provider, mutated under a single-writer-per-key
//! `DashMap` entry so readers always observe the last write without a
//! crate-wide lock. Grounded on the source's `pipeline_state.rs`
//! `ComponentInfo::update_health` consecutive-failure bookkeeping,
//! generalized to a weighted EWMA/health-score composite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use scheduler_common::HealthSnapshot;

/// EWMA smoothing factor applied to the rolling response time.
const EWMA_ALPHA: f64 = 0.1;

/// Consecutive probe failures before a provider is marked unhealthy.
const DEFAULT_UNHEALTHY_THRESHOLD: u32 = 3;

/// Weights for the composite health score (§4.1): error rate 40%, latency
/// 30%, consecutive failures 20%, liveness 10%.
#[derive(Debug, Clone, Copy)]
pub struct HealthScoreWeights {
    pub error_rate: f64,
    pub latency: f64,
    pub consecutive_failures: f64,
    pub liveness: f64,
    pub latency_ceiling_ms: f64,
}

impl Default for HealthScoreWeights {
    fn default() -> Self {
        Self {
            error_rate: 0.4,
            latency: 0.3,
            consecutive_failures: 0.2,
            liveness: 0.1,
            latency_ceiling_ms: 1000.0,
        }
    }
}

struct TrackedSnapshot {
    snapshot: HealthSnapshot,
    /// Running sum, kept alongside `totalRequests` so `averageResponseTime`
    /// can stay a plain arithmetic mean (distinct from the EWMA
    /// `rollingResponseTime`).
    response_time_sum_ms: u64,
}

impl Default for TrackedSnapshot {
    fn default() -> Self {
        Self {
            snapshot: HealthSnapshot::default(),
            response_time_sum_ms: 0,
        }
    }
}

/// Per-provider rolling health metrics.
pub struct HealthTracker {
    snapshots: DashMap<String, TrackedSnapshot>,
    weights: HealthScoreWeights,
    unhealthy_threshold: u32,
    generation: AtomicU64,
}

impl HealthTracker {
    pub fn new(weights: HealthScoreWeights) -> Self {
        Self {
            snapshots: DashMap::new(),
            weights,
            unhealthy_threshold: DEFAULT_UNHEALTHY_THRESHOLD,
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_unhealthy_threshold(mut self, threshold: u32) -> Self {
        self.unhealthy_threshold = threshold;
        self
    }

    /// Record the outcome of one call against `provider_id`.
    pub fn record(&self, provider_id: &str, success: bool, latency_ms: u64) {
        let mut entry = self.snapshots.entry(provider_id.to_string()).or_default();
        let now = Utc::now();

        entry.snapshot.total_requests += 1;
        entry.response_time_sum_ms += latency_ms;
        entry.snapshot.average_response_time_ms =
            entry.response_time_sum_ms as f64 / entry.snapshot.total_requests as f64;

        entry.snapshot.rolling_response_time_ms = if entry.snapshot.total_requests == 1 {
            latency_ms as f64
        } else {
            EWMA_ALPHA * latency_ms as f64 + (1.0 - EWMA_ALPHA) * entry.snapshot.rolling_response_time_ms
        };

        if success {
            entry.snapshot.consecutive_failures = 0;
        } else {
            entry.snapshot.total_failures += 1;
            entry.snapshot.consecutive_failures += 1;
        }

        entry.snapshot.error_rate =
            entry.snapshot.total_failures as f64 / entry.snapshot.total_requests as f64;
        entry.snapshot.last_used = Some(now);

        if !success && entry.snapshot.consecutive_failures >= self.unhealthy_threshold {
            entry.snapshot.is_healthy = false;
        }

        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    /// Weighted composite health score in `[0,1]`. A provider with no
    /// recorded snapshot is treated as healthy (1.0) rather than penalized
    /// for lack of data.
    pub fn health_score(&self, provider_id: &str) -> f64 {
        let Some(entry) = self.snapshots.get(provider_id) else {
            return 1.0;
        };
        let s = &entry.snapshot;

        let error_component = (1.0 - s.error_rate).clamp(0.0, 1.0);
        let latency_component =
            (1.0 - (s.rolling_response_time_ms / self.weights.latency_ceiling_ms)).clamp(0.0, 1.0);
        let failures_component =
            1.0 - (s.consecutive_failures as f64 / 10.0).min(1.0);
        let liveness_component = if s.is_healthy { 1.0 } else { 0.0 };

        (error_component * self.weights.error_rate
            + latency_component * self.weights.latency
            + failures_component * self.weights.consecutive_failures
            + liveness_component * self.weights.liveness)
            .clamp(0.0, 1.0)
    }

    pub fn mark_unhealthy(&self, provider_id: &str) {
        self.snapshots.entry(provider_id.to_string()).or_default().snapshot.is_healthy = false;
    }

    pub fn mark_healthy(&self, provider_id: &str) {
        let mut entry = self.snapshots.entry(provider_id.to_string()).or_default();
        entry.snapshot.is_healthy = true;
        entry.snapshot.consecutive_failures = 0;
    }

    /// Record the result of a periodic liveness probe, independent of
    /// request traffic. Mirrors `record` but with `latency_ms=0` folded out.
    pub fn record_probe(&self, provider_id: &str, probe_succeeded: bool) {
        let mut entry = self.snapshots.entry(provider_id.to_string()).or_default();
        entry.snapshot.last_probe = Some(Utc::now());

        if probe_succeeded {
            entry.snapshot.consecutive_failures = 0;
            entry.snapshot.is_healthy = true;
        } else {
            entry.snapshot.consecutive_failures += 1;
            if entry.snapshot.consecutive_failures >= self.unhealthy_threshold {
                entry.snapshot.is_healthy = false;
            }
        }
    }

    pub fn is_healthy(&self, provider_id: &str) -> bool {
        self.snapshots
            .get(provider_id)
            .map(|e| e.snapshot.is_healthy)
            .unwrap_or(true)
    }

    pub fn snapshot(&self, provider_id: &str) -> Option<HealthSnapshot> {
        self.snapshots.get(provider_id).map(|e| e.snapshot.clone())
    }

    pub fn snapshot_all(&self) -> HashMap<String, HealthSnapshot> {
        self.snapshots
            .iter()
            .map(|e| (e.key().clone(), e.value().snapshot.clone()))
            .collect()
    }

    pub fn remove(&self, provider_id: &str) {
        self.snapshots.remove(provider_id);
    }

    /// `true` iff every tracked provider is currently healthy; vacuously
    /// true when nothing is tracked (see `calculate_overall_health`).
    pub fn all_healthy(&self) -> bool {
        self.snapshots.iter().all(|e| e.value().snapshot.is_healthy)
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(HealthScoreWeights::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_healthy_with_full_score() {
        let tracker = HealthTracker::default();
        assert!(tracker.is_healthy("p1"));
        assert_eq!(tracker.health_score("p1"), 1.0);
    }

    #[test]
    fn error_rate_and_total_failures_stay_within_invariants() {
        let tracker = HealthTracker::default();
        for _ in 0..7 {
            tracker.record("p1", true, 100);
        }
        for _ in 0..3 {
            tracker.record("p1", false, 100);
        }
        let s = tracker.snapshot("p1").unwrap();
        assert_eq!(s.total_requests, 10);
        assert!(s.total_failures <= s.total_requests);
        assert!(s.error_rate >= 0.0 && s.error_rate <= 1.0);
        assert!((s.error_rate - 0.3).abs() < 1e-9);
    }

    #[test]
    fn consecutive_failures_resets_on_success() {
        let tracker = HealthTracker::default();
        tracker.record("p1", false, 50);
        tracker.record("p1", false, 50);
        tracker.record("p1", true, 50);
        assert_eq!(tracker.snapshot("p1").unwrap().consecutive_failures, 0);
    }

    #[test]
    fn marks_unhealthy_after_threshold_consecutive_failures() {
        let tracker = HealthTracker::default().with_unhealthy_threshold(3);
        tracker.record("p1", false, 50);
        tracker.record("p1", false, 50);
        assert!(tracker.is_healthy("p1"));
        tracker.record("p1", false, 50);
        assert!(!tracker.is_healthy("p1"));
    }

    #[test]
    fn health_score_degrades_with_latency_above_ceiling() {
        let tracker = HealthTracker::default();
        tracker.record("p1", true, 5000);
        let score = tracker.health_score("p1");
        assert!(score < 1.0);
    }
}
