//! LoadBalancer strategy family (C3). Selects one pipeline from a candidate
//! set already filtered to enabled, non-blacklisted, breaker-not-open
//! providers. Grounded on the source's `LoadBalancer::select_endpoint`
//! dispatch-by-algorithm shape, generalized from 4 hardcoded algorithms to
//! the full 6-strategy family with exact tie-break rules.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use scheduler_common::config::LoadBalancingStrategy;
use scheduler_common::{Error, Result};

/// One selectable pipeline, as seen by the balancer. Cheap to construct per
/// selection call from the scheduler's live state.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub pipeline_id: String,
    pub instance_id: Option<String>,
    pub weight: f64,
    pub total_requests: u64,
    pub average_response_time_ms: f64,
    pub health_score: f64,
}

/// Parameters controlling adaptive strategy selection (§4.3).
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveThresholds {
    pub health_score_floor: f64,
    pub latency_variance_ratio: f64,
}

impl Default for AdaptiveThresholds {
    fn default() -> Self {
        Self {
            health_score_floor: 0.5,
            latency_variance_ratio: 3.0,
        }
    }
}

pub struct LoadBalancer {
    round_robin_counter: AtomicUsize,
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self {
            round_robin_counter: AtomicUsize::new(0),
        }
    }
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the strategy actually used this call, honoring the adaptive
    /// overrides ahead of the configured default.
    pub fn resolve_strategy(
        &self,
        configured: LoadBalancingStrategy,
        enable_load_balancing: bool,
        candidates: &[Candidate],
        thresholds: AdaptiveThresholds,
    ) -> LoadBalancingStrategy {
        if !enable_load_balancing {
            return LoadBalancingStrategy::RoundRobin;
        }
        if candidates.is_empty() {
            return configured;
        }

        let min_health = candidates
            .iter()
            .map(|c| c.health_score)
            .fold(f64::INFINITY, f64::min);
        if min_health < thresholds.health_score_floor {
            return LoadBalancingStrategy::HealthAware;
        }

        let (min_latency, max_latency) = candidates.iter().fold(
            (f64::INFINITY, 0.0_f64),
            |(min, max), c| (min.min(c.average_response_time_ms), max.max(c.average_response_time_ms)),
        );
        if min_latency > 0.0 && max_latency / min_latency > thresholds.latency_variance_ratio {
            return LoadBalancingStrategy::LeastLatency;
        }

        configured
    }

    /// Select one candidate, honoring `preferred_pipeline_id` ahead of the
    /// strategy when it is present in the set.
    pub fn select<'a>(
        &self,
        strategy: LoadBalancingStrategy,
        candidates: &'a [Candidate],
        preferred_pipeline_id: Option<&str>,
    ) -> Result<&'a Candidate> {
        if candidates.is_empty() {
            return Err(Error::NoAvailablePipelines);
        }

        if let Some(preferred) = preferred_pipeline_id {
            if let Some(c) = candidates.iter().find(|c| c.pipeline_id == preferred) {
                return Ok(c);
            }
        }

        Ok(match strategy {
            LoadBalancingStrategy::RoundRobin => self.round_robin(candidates),
            LoadBalancingStrategy::WeightedRandom => self.weighted_random(candidates),
            LoadBalancingStrategy::LeastConnections => self.least_connections(candidates),
            LoadBalancingStrategy::LeastLatency => self.least_latency(candidates),
            LoadBalancingStrategy::HealthAware => self.health_aware(candidates),
            LoadBalancingStrategy::Random => self.random(candidates),
        })
    }

    fn round_robin<'a>(&self, candidates: &'a [Candidate]) -> &'a Candidate {
        let idx = self.round_robin_counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
        &candidates[idx]
    }

    fn weighted_random<'a>(&self, candidates: &'a [Candidate]) -> &'a Candidate {
        let total_weight: f64 = candidates.iter().map(|c| c.weight).sum();
        if total_weight <= 0.0 {
            return self.random(candidates);
        }
        let x = rand::thread_rng().gen_range(0.0..total_weight);
        let mut cumulative = 0.0;
        for c in candidates {
            cumulative += c.weight;
            if cumulative >= x {
                return c;
            }
        }
        candidates.last().expect("non-empty candidate set")
    }

    fn least_connections<'a>(&self, candidates: &'a [Candidate]) -> &'a Candidate {
        let mut best = &candidates[0];
        for c in &candidates[1..] {
            if c.total_requests < best.total_requests {
                best = c;
            }
        }
        best
    }

    fn least_latency<'a>(&self, candidates: &'a [Candidate]) -> &'a Candidate {
        let mut best = &candidates[0];
        for c in &candidates[1..] {
            if c.average_response_time_ms < best.average_response_time_ms
                || (c.average_response_time_ms == best.average_response_time_ms
                    && c.health_score > best.health_score)
            {
                best = c;
            }
        }
        best
    }

    fn health_aware<'a>(&self, candidates: &'a [Candidate]) -> &'a Candidate {
        let mut best = &candidates[0];
        for c in &candidates[1..] {
            if c.health_score > best.health_score
                || (c.health_score == best.health_score
                    && c.average_response_time_ms < best.average_response_time_ms)
                || (c.health_score == best.health_score
                    && c.average_response_time_ms == best.average_response_time_ms
                    && c.weight > best.weight)
            {
                best = c;
            }
        }
        best
    }

    fn random<'a>(&self, candidates: &'a [Candidate]) -> &'a Candidate {
        let idx = rand::thread_rng().gen_range(0..candidates.len());
        &candidates[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, weight: f64, total_requests: u64, latency: f64, health: f64) -> Candidate {
        Candidate {
            pipeline_id: id.to_string(),
            instance_id: None,
            weight,
            total_requests,
            average_response_time_ms: latency,
            health_score: health,
        }
    }

    #[test]
    fn round_robin_visits_every_candidate_exactly_once_per_cycle() {
        let lb = LoadBalancer::new();
        let candidates = vec![candidate("p1", 1.0, 0, 100.0, 1.0), candidate("p2", 1.0, 0, 100.0, 1.0)];
        let mut seen = std::collections::HashMap::new();
        for _ in 0..4 {
            let chosen = lb.select(LoadBalancingStrategy::RoundRobin, &candidates, None).unwrap();
            *seen.entry(chosen.pipeline_id.clone()).or_insert(0) += 1;
        }
        assert_eq!(seen.get("p1"), Some(&2));
        assert_eq!(seen.get("p2"), Some(&2));
    }

    #[test]
    fn least_connections_breaks_ties_by_insertion_order() {
        let lb = LoadBalancer::new();
        let candidates = vec![candidate("p1", 1.0, 5, 100.0, 1.0), candidate("p2", 1.0, 5, 100.0, 1.0)];
        let chosen = lb.select(LoadBalancingStrategy::LeastConnections, &candidates, None).unwrap();
        assert_eq!(chosen.pipeline_id, "p1");
    }

    #[test]
    fn preferred_pipeline_wins_when_selectable() {
        let lb = LoadBalancer::new();
        let candidates = vec![candidate("p1", 1.0, 0, 100.0, 1.0), candidate("p2", 1.0, 0, 100.0, 1.0)];
        let chosen = lb.select(LoadBalancingStrategy::RoundRobin, &candidates, Some("p2")).unwrap();
        assert_eq!(chosen.pipeline_id, "p2");
    }

    #[test]
    fn empty_candidate_set_fails_with_no_available_pipelines() {
        let lb = LoadBalancer::new();
        let err = lb.select(LoadBalancingStrategy::RoundRobin, &[], None).unwrap_err();
        assert!(matches!(err, Error::NoAvailablePipelines));
    }

    #[test]
    fn health_aware_maximizes_health_score() {
        let lb = LoadBalancer::new();
        let candidates = vec![candidate("p1", 1.0, 0, 100.0, 0.4), candidate("p2", 1.0, 0, 100.0, 0.9)];
        let chosen = lb.select(LoadBalancingStrategy::HealthAware, &candidates, None).unwrap();
        assert_eq!(chosen.pipeline_id, "p2");
    }

    #[test]
    fn adaptive_chooses_health_aware_below_floor() {
        let lb = LoadBalancer::new();
        let candidates = vec![candidate("p1", 1.0, 0, 100.0, 0.2), candidate("p2", 1.0, 0, 100.0, 0.9)];
        let strategy = lb.resolve_strategy(
            LoadBalancingStrategy::RoundRobin,
            true,
            &candidates,
            AdaptiveThresholds::default(),
        );
        assert_eq!(strategy, LoadBalancingStrategy::HealthAware);
    }

    #[test]
    fn adaptive_chooses_least_latency_on_high_variance() {
        let lb = LoadBalancer::new();
        let candidates = vec![candidate("p1", 1.0, 0, 50.0, 0.9), candidate("p2", 1.0, 0, 500.0, 0.9)];
        let strategy = lb.resolve_strategy(
            LoadBalancingStrategy::RoundRobin,
            true,
            &candidates,
            AdaptiveThresholds::default(),
        );
        assert_eq!(strategy, LoadBalancingStrategy::LeastLatency);
    }

    #[test]
    fn adaptive_forces_round_robin_when_balancing_disabled() {
        let lb = LoadBalancer::new();
        let candidates = vec![candidate("p1", 1.0, 0, 50.0, 0.1)];
        let strategy = lb.resolve_strategy(
            LoadBalancingStrategy::HealthAware,
            false,
            &candidates,
            AdaptiveThresholds::default(),
        );
        assert_eq!(strategy, LoadBalancingStrategy::RoundRobin);
    }
}
