//! Aggregate health rollup shared by `healthCheck` and `getSchedulerStats`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Critical,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthLevel,
    pub message: String,
    pub last_check: DateTime<Utc>,
    pub metrics: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub overall_health: HealthLevel,
    pub components: HashMap<String, ComponentHealth>,
    pub last_check: DateTime<Utc>,
    pub uptime_seconds: u64,
}

impl HealthStatus {
    /// Any component critical -> critical; any degraded -> degraded; empty
    /// or all-healthy -> healthy. An empty component set is not "unknown":
    /// a scheduler with zero registered pipelines is vacuously healthy,
    /// matching the healthCheckSuccessRate=1.0-on-zero convention.
    pub fn calculate_overall_health(&mut self) {
        let any_critical = self.components.values().any(|c| c.status == HealthLevel::Critical);
        let any_degraded = self.components.values().any(|c| c.status == HealthLevel::Degraded);

        self.overall_health = if any_critical {
            HealthLevel::Critical
        } else if any_degraded {
            HealthLevel::Degraded
        } else {
            HealthLevel::Healthy
        };
    }
}
