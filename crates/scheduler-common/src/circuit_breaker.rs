//! Per-provider three-state circuit breaker.
//!
//! Unlike a sliding-window failure-rate breaker, this one trips on a plain
//! consecutive failure count, matching the scheduler's need for a breaker
//! whose Closed -> Open transition is exactly `failureCount >= threshold`.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::types::CircuitState;

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures required to open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a probe call.
    pub recovery_timeout: std::time::Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: std::time::Duration::from_millis(60_000),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<DateTime<Utc>>,
    recovery_deadline: Option<DateTime<Utc>>,
}

/// A single provider/instance circuit breaker. Transitions are linearizable:
/// every read and write goes through the same `RwLock`.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Arc<RwLock<Inner>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Arc::new(RwLock::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                recovery_deadline: None,
            })),
        }
    }

    /// Whether a call should be allowed right now. In `Open` state this also
    /// performs the Open -> HalfOpen transition if the recovery deadline has
    /// passed, admitting exactly the call that observed the transition.
    pub async fn should_allow_call(&self) -> bool {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let now = Utc::now();
                if inner.recovery_deadline.map(|d| now >= d).unwrap_or(false) {
                    info!("circuit breaker '{}' -> half-open", self.name);
                    inner.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record the outcome of an admitted call.
    pub async fn record_call_result(&self, success: bool) {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::Closed => {
                if success {
                    inner.failure_count = 0;
                } else {
                    inner.failure_count += 1;
                    inner.last_failure_time = Some(Utc::now());
                    if inner.failure_count >= self.config.failure_threshold {
                        warn!(
                            "circuit breaker '{}' -> open after {} failures",
                            self.name, inner.failure_count
                        );
                        inner.state = CircuitState::Open;
                        inner.recovery_deadline =
                            Some(Utc::now() + chrono_duration(self.config.recovery_timeout));
                    }
                }
            }
            CircuitState::HalfOpen => {
                if success {
                    info!("circuit breaker '{}' -> closed", self.name);
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.recovery_deadline = None;
                } else {
                    warn!("circuit breaker '{}' re-opened after half-open probe failed", self.name);
                    inner.state = CircuitState::Open;
                    inner.failure_count += 1;
                    inner.last_failure_time = Some(Utc::now());
                    inner.recovery_deadline =
                        Some(Utc::now() + chrono_duration(self.config.recovery_timeout));
                }
            }
            CircuitState::Open => {
                // Calls shouldn't be recorded while open; ignore defensively.
            }
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    pub async fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.read().await;
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_time: inner.last_failure_time,
            recovery_deadline: inner.recovery_deadline,
        }
    }

    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure_time = None;
        inner.recovery_deadline = None;
    }

    pub async fn force_open(&self) {
        let mut inner = self.inner.write().await;
        inner.state = CircuitState::Open;
        inner.recovery_deadline = Some(Utc::now() + chrono_duration(self.config.recovery_timeout));
    }
}

fn chrono_duration(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::milliseconds(i64::MAX / 2))
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub recovery_deadline: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn stays_closed_on_success() {
        let cb = CircuitBreaker::new("p1", CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(50),
        });
        assert_eq!(cb.state().await, CircuitState::Closed);
        cb.record_call_result(true).await;
        cb.record_call_result(true).await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let cb = CircuitBreaker::new("p1", CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(50),
        });
        for _ in 0..3 {
            assert!(cb.should_allow_call().await);
            cb.record_call_result(false).await;
        }
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.should_allow_call().await);
    }

    #[tokio::test]
    async fn half_open_admits_one_probe_after_recovery_timeout() {
        let cb = CircuitBreaker::new("p1", CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_millis(30),
        });
        cb.record_call_result(false).await;
        cb.record_call_result(false).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        sleep(Duration::from_millis(40)).await;

        assert!(cb.should_allow_call().await);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        cb.record_call_result(true).await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_with_refreshed_deadline() {
        let cb = CircuitBreaker::new("p1", CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(30),
        });
        cb.record_call_result(false).await;
        assert_eq!(cb.state().await, CircuitState::Open);
        sleep(Duration::from_millis(40)).await;
        assert!(cb.should_allow_call().await);
        cb.record_call_result(false).await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }
}
