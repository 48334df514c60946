//! Scheduler configuration tree. Loading/parsing a config file is explicitly
//! out of scope (the configuration-loader collaborator); this module only
//! defines the shape and defaults consumed by the scheduler.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::PipelineDescriptor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub load_balancer: LoadBalancerConfig,
    pub scheduler: SchedulerCoreConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub error_response: ErrorResponseConfig,
    pub optimizer: OptimizerConfig,
    pub pipelines: Vec<PipelineDescriptor>,
}

/// Canonical strategy names. Accepts the mixed spellings the source used
/// (`least-connections`, `least_connections`, ...) only at the config-parsing
/// boundary (see `LoadBalancingStrategy::parse`); internally there is exactly
/// one spelling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LoadBalancingStrategy {
    RoundRobin,
    WeightedRandom,
    LeastConnections,
    LeastLatency,
    HealthAware,
    Random,
}

impl LoadBalancingStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "roundrobin" | "round_robin" => Some(Self::RoundRobin),
            "weighted" | "weighted_random" => Some(Self::WeightedRandom),
            "least_connections" => Some(Self::LeastConnections),
            "least_latency" => Some(Self::LeastLatency),
            "health_aware" => Some(Self::HealthAware),
            "random" => Some(Self::Random),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    pub strategy: LoadBalancingStrategy,
    pub health_check_interval: Duration,
    pub enable_load_balancing: bool,
    pub health_score_floor: f64,
    pub latency_variance_ratio: f64,
    pub latency_ceiling_ms: f64,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            strategy: LoadBalancingStrategy::RoundRobin,
            health_check_interval: Duration::from_millis(30_000),
            enable_load_balancing: true,
            health_score_floor: 0.5,
            latency_variance_ratio: 3.0,
            latency_ceiling_ms: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerCoreConfig {
    pub default_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub blacklist_cleanup_interval: Duration,
    pub blacklist_threshold: u32,
    pub metrics_aggregation_interval: Duration,
}

impl Default for SchedulerCoreConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(30_000),
            max_retries: 3,
            retry_delay: Duration::from_millis(0),
            blacklist_cleanup_interval: Duration::from_millis(60_000),
            blacklist_threshold: 5,
            metrics_aggregation_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_millis(60_000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponseConfig {
    pub recovery_action_timeout: Duration,
    pub max_error_history_size: usize,
    pub error_cleanup_interval: Duration,
}

impl Default for ErrorResponseConfig {
    fn default() -> Self {
        Self {
            recovery_action_timeout: Duration::from_millis(30_000),
            max_error_history_size: 1000,
            error_cleanup_interval: Duration::from_millis(300_000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub enable_caching: bool,
    pub cache_ttl: Duration,
    pub enable_concurrency_limit: bool,
    pub max_concurrency: usize,
    pub queue_high_watermark: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enable_caching: false,
            cache_ttl: Duration::from_secs(30),
            enable_concurrency_limit: false,
            max_concurrency: 64,
            queue_high_watermark: 256,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            load_balancer: LoadBalancerConfig::default(),
            scheduler: SchedulerCoreConfig::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            error_response: ErrorResponseConfig::default(),
            optimizer: OptimizerConfig::default(),
            pipelines: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_mixed_strategy_spellings() {
        assert_eq!(LoadBalancingStrategy::parse("least-connections"), Some(LoadBalancingStrategy::LeastConnections));
        assert_eq!(LoadBalancingStrategy::parse("least_connections"), Some(LoadBalancingStrategy::LeastConnections));
        assert_eq!(LoadBalancingStrategy::parse("roundrobin"), Some(LoadBalancingStrategy::RoundRobin));
        assert_eq!(LoadBalancingStrategy::parse("health_aware"), Some(LoadBalancingStrategy::HealthAware));
    }
}
