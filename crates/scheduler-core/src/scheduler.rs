//! The Scheduler (C7): orchestrates candidate selection, execution under a
//! deadline, health/breaker bookkeeping, and the retry/failover loop, then
//! exposes pipeline lifecycle and stats to the bootstrap collaborator.
//! Grounded on the source's `PipelineGuard`'s `tokio::spawn` + `interval`
//! background-worker shape, recombined around a single top-level
//! orchestrator instead of a guard sitting beside a gateway.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use scheduler_balancer::{AdaptiveThresholds, BlacklistManager, Candidate, LoadBalancer};
use scheduler_common::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};
use scheduler_common::config::SchedulerConfig;
use scheduler_common::{
    BlacklistEntry, CircuitState, ComponentHealth, Error, ErrorCode, ExecutionContext,
    ExecutionResult, ExecutionStatus, HealthLevel, HealthStatus, InstanceState, MessageSink,
    Payload, PipelineDescriptor, PipelineError, PipelineId, PipelineInstance, RecoveryAction,
    Result as SchedulerResult, SchedulerEvent,
};
use scheduler_errors::{classify_phase, EnhancedErrorResponseCenter, ErrorMetricsSnapshot, InstanceFailureHistory};
use scheduler_health::HealthTracker;
use scheduler_optimizer::RequestOptimizer;

/// Options accepted by `execute`, mirroring §6's recognized `execute` inputs.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub preferred_pipeline_id: Option<PipelineId>,
    pub retry_delay: Option<Duration>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct PipelineStatusSnapshot {
    pub descriptor: PipelineDescriptor,
    pub enabled: bool,
    pub maintenance: bool,
    pub instance_state: InstanceState,
    pub health: scheduler_common::HealthSnapshot,
    pub breaker: CircuitBreakerStats,
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerStatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retries: u64,
    pub failovers: u64,
    pub registered_pipelines: usize,
    pub error_metrics: ErrorMetricsSnapshot,
}

#[derive(Default)]
struct SchedulerStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    retries: AtomicU64,
    failovers: AtomicU64,
}

fn state_to_u8(s: InstanceState) -> u8 {
    match s {
        InstanceState::Uninitialized => 0,
        InstanceState::Ready => 1,
        InstanceState::Draining => 2,
        InstanceState::Stopped => 3,
        InstanceState::Error => 4,
    }
}

fn u8_to_state(v: u8) -> InstanceState {
    match v {
        0 => InstanceState::Uninitialized,
        1 => InstanceState::Ready,
        2 => InstanceState::Draining,
        3 => InstanceState::Stopped,
        _ => InstanceState::Error,
    }
}

/// One registered pipeline descriptor bound to its live instance. Simplified
/// to one active instance per descriptor; `instance_id` stays `None`
/// throughout the scheduler, leaving the data model's per-instance slot
/// available for a future multi-instance pool without a wire-format change.
struct PipelineRuntime {
    descriptor: PipelineDescriptor,
    instance: Arc<dyn PipelineInstance>,
    enabled: AtomicBool,
    maintenance: AtomicBool,
    state: AtomicU8,
    breaker: CircuitBreaker,
}

/// Sink for the response center's telemetry events (§4.6); the scheduler's
/// own retry/failover/maintenance decisions are driven synchronously by the
/// `ErrorResponse.recovery_action` each handler call returns, not by this
/// channel, so this side just logs.
struct SchedulerSink;

#[async_trait]
impl MessageSink for SchedulerSink {
    async fn send(&self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::RetryRequested { pipeline_id, delay } => {
                debug!(pipeline_id = %pipeline_id, ?delay, "retry requested");
            }
            SchedulerEvent::FailoverRequested { pipeline_id, instance_id } => {
                debug!(pipeline_id = %pipeline_id, ?instance_id, "failover requested");
            }
            SchedulerEvent::MaintenanceRequested { pipeline_id } => {
                warn!(pipeline_id = %pipeline_id, "maintenance requested");
            }
            SchedulerEvent::Ping | SchedulerEvent::HealthCheck | SchedulerEvent::Shutdown => {}
        }
    }
}

/// The top-level scheduling and error-response engine (C7).
pub struct Scheduler {
    config: SchedulerConfig,
    pipelines: Arc<DashMap<PipelineId, Arc<PipelineRuntime>>>,
    health: Arc<HealthTracker>,
    balancer: LoadBalancer,
    blacklist: Arc<BlacklistManager>,
    error_center: Arc<EnhancedErrorResponseCenter>,
    optimizer: Arc<RequestOptimizer>,
    stats: Arc<SchedulerStats>,
    initialized: AtomicBool,
    shutting_down: AtomicBool,
    workers: std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
    started_at: DateTime<Utc>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let error_center = Arc::new(EnhancedErrorResponseCenter::new(
            config.error_response.clone(),
            Arc::new(SchedulerSink),
        ));
        let optimizer = Arc::new(RequestOptimizer::new(&config.optimizer));

        Self {
            config,
            pipelines: Arc::new(DashMap::new()),
            health: Arc::new(HealthTracker::default()),
            balancer: LoadBalancer::new(),
            blacklist: Arc::new(BlacklistManager::new()),
            error_center,
            optimizer,
            stats: Arc::new(SchedulerStats::default()),
            initialized: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            workers: std::sync::Mutex::new(Vec::new()),
            started_at: Utc::now(),
        }
    }

    /// Start background workers: health probing, blacklist sweeping, and
    /// error-ring metrics aggregation. Idempotent: a second call fails
    /// rather than doubling the worker set.
    pub async fn initialize(&self) -> SchedulerResult<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(Error::InitializationFailed("scheduler already initialized".into()));
        }
        self.spawn_health_check_worker();
        self.spawn_blacklist_sweep_worker();
        self.spawn_metrics_aggregation_worker();
        Ok(())
    }

    fn spawn_health_check_worker(&self) {
        let pipelines = self.pipelines.clone();
        let health = self.health.clone();
        let interval = self.config.load_balancer.health_check_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let runtimes: Vec<Arc<PipelineRuntime>> =
                    pipelines.iter().map(|e| e.value().clone()).collect();
                for rt in runtimes {
                    let ok = rt.instance.health_probe().await;
                    health.record_probe(&rt.descriptor.id, ok);
                }
            }
        });
        self.workers.lock().unwrap().push(handle);
    }

    fn spawn_blacklist_sweep_worker(&self) {
        let blacklist = self.blacklist.clone();
        let interval = self.config.scheduler.blacklist_cleanup_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                blacklist.sweep(Utc::now());
            }
        });
        self.workers.lock().unwrap().push(handle);
    }

    fn spawn_metrics_aggregation_worker(&self) {
        let error_center = self.error_center.clone();
        let interval = self.config.scheduler.metrics_aggregation_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                error_center.cleanup_ring();
            }
        });
        self.workers.lock().unwrap().push(handle);
    }

    pub fn create_pipeline(
        &self,
        descriptor: PipelineDescriptor,
        instance: Arc<dyn PipelineInstance>,
    ) -> SchedulerResult<PipelineId> {
        if self.pipelines.contains_key(&descriptor.id) {
            return Err(Error::AlreadyExists(descriptor.id));
        }
        let id = descriptor.id.clone();
        let enabled = descriptor.enabled;
        let breaker = CircuitBreaker::new(
            id.clone(),
            CircuitBreakerConfig {
                failure_threshold: self.config.circuit_breaker.failure_threshold,
                recovery_timeout: self.config.circuit_breaker.recovery_timeout,
            },
        );
        let runtime = Arc::new(PipelineRuntime {
            descriptor,
            instance,
            enabled: AtomicBool::new(enabled),
            maintenance: AtomicBool::new(false),
            state: AtomicU8::new(state_to_u8(InstanceState::Ready)),
            breaker,
        });
        self.pipelines.insert(id.clone(), runtime);
        Ok(id)
    }

    pub fn destroy_pipeline(&self, pipeline_id: &str) -> SchedulerResult<()> {
        match self.pipelines.remove(pipeline_id) {
            Some(_) => {
                self.health.remove(pipeline_id);
                Ok(())
            }
            None => Err(Error::NotFound(pipeline_id.to_string())),
        }
    }

    pub fn enable_pipeline(&self, pipeline_id: &str) -> SchedulerResult<()> {
        let rt = self.lookup(pipeline_id)?;
        rt.enabled.store(true, Ordering::SeqCst);
        rt.state.store(state_to_u8(InstanceState::Ready), Ordering::SeqCst);
        Ok(())
    }

    pub fn disable_pipeline(&self, pipeline_id: &str) -> SchedulerResult<()> {
        let rt = self.lookup(pipeline_id)?;
        rt.enabled.store(false, Ordering::SeqCst);
        rt.state.store(state_to_u8(InstanceState::Draining), Ordering::SeqCst);
        Ok(())
    }

    pub fn set_pipeline_maintenance(&self, pipeline_id: &str, maintenance: bool) -> SchedulerResult<()> {
        let rt = self.lookup(pipeline_id)?;
        rt.maintenance.store(maintenance, Ordering::SeqCst);
        Ok(())
    }

    pub async fn get_pipeline_status(&self, pipeline_id: &str) -> SchedulerResult<PipelineStatusSnapshot> {
        let rt = self.lookup(pipeline_id)?;
        Ok(PipelineStatusSnapshot {
            descriptor: rt.descriptor.clone(),
            enabled: rt.enabled.load(Ordering::Relaxed),
            maintenance: rt.maintenance.load(Ordering::Relaxed),
            instance_state: u8_to_state(rt.state.load(Ordering::Relaxed)),
            health: self.health.snapshot(pipeline_id).unwrap_or_default(),
            breaker: rt.breaker.stats().await,
        })
    }

    pub fn get_scheduler_stats(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            total_requests: self.stats.total_requests.load(Ordering::Relaxed),
            successful_requests: self.stats.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.stats.failed_requests.load(Ordering::Relaxed),
            retries: self.stats.retries.load(Ordering::Relaxed),
            failovers: self.stats.failovers.load(Ordering::Relaxed),
            registered_pipelines: self.pipelines.len(),
            error_metrics: self.error_center.metrics_snapshot(),
        }
    }

    /// All registered instances healthy and no breaker tripped; vacuously
    /// true with zero registered pipelines.
    /// Per-pipeline breakdown plus an aggregate rollup; vacuously healthy
    /// with zero registered pipelines.
    pub async fn health_check(&self) -> HealthStatus {
        let now = Utc::now();
        let mut components = HashMap::new();

        for entry in self.pipelines.iter() {
            let rt = entry.value();
            let breaker_open = rt.breaker.state().await == CircuitState::Open;
            let healthy = self.health.is_healthy(&rt.descriptor.id);

            let status = if breaker_open {
                HealthLevel::Critical
            } else if !healthy {
                HealthLevel::Degraded
            } else {
                HealthLevel::Healthy
            };

            let snapshot = self.health.snapshot(&rt.descriptor.id).unwrap_or_default();
            let mut metrics = HashMap::new();
            metrics.insert("error_rate".to_string(), snapshot.error_rate);
            metrics.insert("average_response_time_ms".to_string(), snapshot.average_response_time_ms);
            metrics.insert("health_score".to_string(), self.health.health_score(&rt.descriptor.id));

            components.insert(
                rt.descriptor.id.clone(),
                ComponentHealth {
                    status,
                    message: if breaker_open {
                        "circuit breaker open".to_string()
                    } else if !healthy {
                        "unhealthy".to_string()
                    } else {
                        "ok".to_string()
                    },
                    last_check: now,
                    metrics,
                },
            );
        }

        let mut status = HealthStatus {
            overall_health: HealthLevel::Healthy,
            components,
            last_check: now,
            uptime_seconds: (now - self.started_at).num_seconds().max(0) as u64,
        };
        status.calculate_overall_health();
        status
    }

    pub async fn shutdown(&self) -> SchedulerResult<()> {
        self.shutting_down.store(true, Ordering::SeqCst);
        let handles: Vec<_> = self.workers.lock().unwrap().drain(..).collect();
        for handle in handles {
            handle.abort();
        }
        Ok(())
    }

    fn lookup(&self, pipeline_id: &str) -> SchedulerResult<Arc<PipelineRuntime>> {
        self.pipelines
            .get(pipeline_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::NotFound(pipeline_id.to_string()))
    }

    /// Builds the selectable candidate pool, plus whether every otherwise
    /// eligible pipeline excluded itself solely on an open breaker — that
    /// distinction decides whether an empty pool surfaces as `CircuitOpen`
    /// (short-circuited) or `NoAvailablePipelines` (§8 scenario 4).
    async fn candidate_set(&self, exclude: &HashSet<PipelineId>) -> (Vec<Candidate>, bool) {
        let mut out = Vec::new();
        let mut any_circuit_open = false;
        for entry in self.pipelines.iter() {
            let rt = entry.value();
            let pid = &rt.descriptor.id;
            if exclude.contains(pid) {
                continue;
            }
            if !rt.enabled.load(Ordering::Relaxed) || rt.maintenance.load(Ordering::Relaxed) {
                continue;
            }
            if u8_to_state(rt.state.load(Ordering::Relaxed)) != InstanceState::Ready {
                continue;
            }
            if self.blacklist.is_blacklisted(pid, None) {
                continue;
            }
            if !rt.breaker.should_allow_call().await {
                any_circuit_open = true;
                continue;
            }
            let snapshot = self.health.snapshot(pid);
            out.push(Candidate {
                pipeline_id: pid.clone(),
                instance_id: None,
                weight: rt.descriptor.weight as f64,
                total_requests: snapshot.as_ref().map(|s| s.total_requests).unwrap_or(0),
                average_response_time_ms: snapshot.as_ref().map(|s| s.average_response_time_ms).unwrap_or(0.0),
                health_score: self.health.health_score(pid),
            });
        }
        (out, any_circuit_open)
    }

    /// Execute `payload` against the candidate pool, retrying/failing over
    /// per the recovery policy until `maxRetries` is exhausted (§4.7).
    pub async fn execute(&self, payload: Payload, options: ExecuteOptions) -> ExecutionResult {
        let execution_id = Uuid::new_v4();
        let start_time = Utc::now();

        if self.shutting_down.load(Ordering::SeqCst) {
            return failed_result(
                execution_id,
                None,
                start_time,
                0,
                ExecutionStatus::Failed,
                PipelineError::new(ErrorCode::SchedulerShuttingDown, "scheduler is shutting down"),
            );
        }

        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);

        let timeout = options.timeout.unwrap_or(self.config.scheduler.default_timeout);
        let max_retries = options.max_retries.unwrap_or(self.config.scheduler.max_retries);
        let fixed_retry_delay = options.retry_delay;
        let deadline = start_time + chrono_duration(timeout);

        let cache_key =
            RequestOptimizer::fingerprint(options.preferred_pipeline_id.as_deref().unwrap_or(""), &payload);
        if let Some(cached) = self.optimizer.lookup(cache_key) {
            self.stats.successful_requests.fetch_add(1, Ordering::Relaxed);
            return cached;
        }

        let _permit = match self.optimizer.acquire_slot().await {
            Ok(permit) => permit,
            Err(error) => {
                self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
                return failed_result(execution_id, None, start_time, 0, ExecutionStatus::Failed, error);
            }
        };

        let mut excluded: HashSet<PipelineId> = HashSet::new();
        let mut retry_count = 0u32;
        // Set on a plain `Retry`: the next iteration re-executes against this
        // same instance instead of selecting again. Anything that changes
        // which pipeline is in play (failover, blacklist, maintenance) clears
        // it so the next iteration falls through to fresh selection.
        let mut pinned: Option<(Candidate, Arc<PipelineRuntime>)> = None;

        loop {
            let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
                return failed_result(
                    execution_id,
                    None,
                    start_time,
                    retry_count,
                    ExecutionStatus::TimedOut,
                    PipelineError::new(ErrorCode::ExecutionTimeout, "deadline exceeded before attempt"),
                );
            }

            let (chosen, rt) = if let Some(pinned) = pinned.take() {
                pinned
            } else {
                let (candidates, any_circuit_open) = self.candidate_set(&excluded).await;
                if candidates.is_empty() && any_circuit_open {
                    self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
                    return failed_result(
                        execution_id,
                        None,
                        start_time,
                        retry_count,
                        ExecutionStatus::Failed,
                        PipelineError::new(ErrorCode::CircuitOpen, "circuit breaker open for all candidates"),
                    );
                }
                let preferred = (retry_count == 0).then(|| options.preferred_pipeline_id.as_deref()).flatten();
                let thresholds = AdaptiveThresholds {
                    health_score_floor: self.config.load_balancer.health_score_floor,
                    latency_variance_ratio: self.config.load_balancer.latency_variance_ratio,
                };
                let strategy = self.balancer.resolve_strategy(
                    self.config.load_balancer.strategy,
                    self.config.load_balancer.enable_load_balancing,
                    &candidates,
                    thresholds,
                );
                let chosen = match self.balancer.select(strategy, &candidates, preferred) {
                    Ok(c) => c.clone(),
                    Err(_) => {
                        self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
                        return failed_result(
                            execution_id,
                            None,
                            start_time,
                            retry_count,
                            ExecutionStatus::Failed,
                            PipelineError::new(ErrorCode::NoAvailablePipelines, "no selectable pipeline"),
                        );
                    }
                };

                let Some(rt) = self.pipelines.get(&chosen.pipeline_id).map(|e| e.value().clone()) else {
                    excluded.insert(chosen.pipeline_id);
                    continue;
                };
                (chosen, rt)
            };

            let ctx = ExecutionContext {
                execution_id,
                pipeline_id: chosen.pipeline_id.clone(),
                instance_id: None,
                start_time,
                timeout: remaining,
                payload: payload.clone(),
                metadata: options.metadata.clone(),
                retry_count,
                max_retries,
            };

            let attempt_start = std::time::Instant::now();
            let outcome = tokio::time::timeout(remaining, rt.instance.execute(ctx.clone())).await;

            let (status, error) = match outcome {
                Ok(result) if result.status == ExecutionStatus::Completed => {
                    let latency = attempt_start.elapsed().as_millis() as u64;
                    self.health.record(&chosen.pipeline_id, true, latency);
                    rt.breaker.record_call_result(true).await;
                    self.stats.successful_requests.fetch_add(1, Ordering::Relaxed);
                    let final_result = completed_result(
                        execution_id,
                        chosen.pipeline_id,
                        start_time,
                        retry_count,
                        result.output,
                    );
                    self.optimizer.store(cache_key, &final_result);
                    return final_result;
                }
                Ok(result) => (
                    result.status,
                    result.error.unwrap_or_else(|| {
                        PipelineError::new(ErrorCode::ExecutionFailed, "pipeline reported failure without detail")
                    }),
                ),
                Err(_elapsed) => (
                    ExecutionStatus::TimedOut,
                    PipelineError::new(ErrorCode::ExecutionTimeout, "execution deadline exceeded"),
                ),
            };

            let latency = attempt_start.elapsed().as_millis() as u64;
            self.health.record(&chosen.pipeline_id, false, latency);
            rt.breaker.record_call_result(false).await;

            let history = InstanceFailureHistory {
                consecutive_failures_this_instance: self
                    .health
                    .snapshot(&chosen.pipeline_id)
                    .map(|s| s.consecutive_failures)
                    .unwrap_or(0),
                blacklist_threshold: self.config.scheduler.blacklist_threshold,
            };
            let error = error.with_pipeline(chosen.pipeline_id.clone());
            let phase = classify_phase(&error);
            let response = match phase {
                scheduler_common::Phase::Send => {
                    self.error_center.handle_local_send(error, &ctx, history, fixed_retry_delay).await
                }
                scheduler_common::Phase::Receive => {
                    self.error_center.handle_local_receive(error, &ctx, history, fixed_retry_delay).await
                }
                scheduler_common::Phase::Server => {
                    self.error_center.handle_server(error, &ctx, history, fixed_retry_delay).await
                }
            };

            // Side effects (blacklisting, entering maintenance) land regardless
            // of remaining retry budget; only whether the scheduler loops
            // around for another attempt depends on `has_budget`.
            let has_budget = retry_count < max_retries;
            match response.recovery_action.clone() {
                Some(RecoveryAction::Retry { delay }) if has_budget => {
                    retry_count += 1;
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                    pinned = Some((chosen.clone(), rt.clone()));
                    continue;
                }
                Some(RecoveryAction::Failover { .. }) if has_budget => {
                    excluded.insert(chosen.pipeline_id);
                    retry_count += 1;
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    self.stats.failovers.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                Some(RecoveryAction::BlacklistTemporary { duration }) => {
                    self.blacklist.add(BlacklistEntry {
                        pipeline_id: chosen.pipeline_id.clone(),
                        instance_id: None,
                        cause: response.code,
                        until: Some(Utc::now() + chrono_duration(duration)),
                        permanent: false,
                        entered_at: Utc::now(),
                    });
                    excluded.insert(chosen.pipeline_id.clone());
                    if has_budget {
                        retry_count += 1;
                        self.stats.retries.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
                    return failed_result(
                        execution_id,
                        Some(chosen.pipeline_id),
                        start_time,
                        retry_count,
                        status,
                        pipeline_error_from_response(&response),
                    );
                }
                Some(RecoveryAction::BlacklistPermanent) => {
                    self.blacklist.add(BlacklistEntry {
                        pipeline_id: chosen.pipeline_id.clone(),
                        instance_id: None,
                        cause: response.code,
                        until: None,
                        permanent: true,
                        entered_at: Utc::now(),
                    });
                    excluded.insert(chosen.pipeline_id.clone());
                    if has_budget {
                        retry_count += 1;
                        self.stats.retries.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
                    return failed_result(
                        execution_id,
                        Some(chosen.pipeline_id),
                        start_time,
                        retry_count,
                        status,
                        pipeline_error_from_response(&response),
                    );
                }
                Some(RecoveryAction::EnterMaintenance) => {
                    rt.maintenance.store(true, Ordering::SeqCst);
                    excluded.insert(chosen.pipeline_id.clone());
                    if has_budget {
                        retry_count += 1;
                        self.stats.retries.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
                    return failed_result(
                        execution_id,
                        Some(chosen.pipeline_id),
                        start_time,
                        retry_count,
                        status,
                        pipeline_error_from_response(&response),
                    );
                }
                _ => {
                    self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
                    return failed_result(
                        execution_id,
                        Some(chosen.pipeline_id),
                        start_time,
                        retry_count,
                        status,
                        pipeline_error_from_response(&response),
                    );
                }
            }
        }
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::milliseconds(i64::MAX / 2))
}

fn completed_result(
    execution_id: Uuid,
    pipeline_id: PipelineId,
    start_time: DateTime<Utc>,
    retry_count: u32,
    output: Option<Payload>,
) -> ExecutionResult {
    let end_time = Utc::now();
    ExecutionResult {
        execution_id,
        pipeline_id,
        instance_id: None,
        status: ExecutionStatus::Completed,
        start_time,
        end_time,
        duration: (end_time - start_time).to_std().unwrap_or(Duration::ZERO),
        error: None,
        retry_count,
        output,
    }
}

fn failed_result(
    execution_id: Uuid,
    pipeline_id: Option<PipelineId>,
    start_time: DateTime<Utc>,
    retry_count: u32,
    status: ExecutionStatus,
    error: PipelineError,
) -> ExecutionResult {
    let end_time = Utc::now();
    ExecutionResult {
        execution_id,
        pipeline_id: pipeline_id.unwrap_or_default(),
        instance_id: None,
        status,
        start_time,
        end_time,
        duration: (end_time - start_time).to_std().unwrap_or(Duration::ZERO),
        error: Some(error),
        retry_count,
        output: None,
    }
}

fn pipeline_error_from_response(response: &scheduler_common::ErrorResponse) -> PipelineError {
    PipelineError {
        code: response.code,
        category: response.category,
        severity: response.severity,
        recoverability: scheduler_common::Recoverability::Recoverable,
        impact: scheduler_common::Impact::Pipeline,
        source: scheduler_common::ErrorSource::Module,
        pipeline_id: response.pipeline_id.clone(),
        instance_id: response.instance_id.clone(),
        timestamp: response.timestamp,
        details: response.details.clone(),
    }
}
