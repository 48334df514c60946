//! EnhancedErrorResponseCenter (C6). Grounded on the source's
//! `AlertManager` (mpsc-channel + background consumer) and `RecoveryEngine`
//! (timeout-wrapped dispatch) shapes, recombined around three
//! phase-specific entry points instead of a single generic handler.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{error, warn};

use scheduler_common::config::ErrorResponseConfig;
use scheduler_common::{
    ErrorCode, ErrorResponse, ExecutionContext, MessageSink, Phase, PipelineError, RecoveryAction,
    SchedulerEvent,
};

use crate::classifier::{classify_phase, http_status};
use crate::recovery_policy::{self, InstanceFailureHistory};

/// A custom, priority-ordered override for a specific error code. The first
/// handler whose `handle` call returns `Some` wins; handler failures (panics
/// are not caught here, only `None`/soft failure) fall through to the next,
/// and ultimately to `RecoveryPolicy` if none match.
#[async_trait]
pub trait CustomHandler: Send + Sync {
    async fn handle(&self, error: &PipelineError, ctx: &ExecutionContext) -> Option<ErrorResponse>;
}

struct RegisteredHandler {
    priority: i32,
    handler: Arc<dyn CustomHandler>,
}

#[derive(Default)]
struct HandlerRegistry {
    handlers: HashMap<ErrorCode, Vec<RegisteredHandler>>,
}

impl HandlerRegistry {
    fn register(&mut self, code: ErrorCode, priority: i32, handler: Arc<dyn CustomHandler>) {
        let entries = self.handlers.entry(code).or_default();
        entries.push(RegisteredHandler { priority, handler });
        entries.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    fn get(&self, code: ErrorCode) -> &[RegisteredHandler] {
        self.handlers.get(&code).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Error counters and a bounded ring buffer of recent errors (§4.6).
#[derive(Debug, Default, Clone)]
pub struct ErrorMetricsSnapshot {
    pub by_code: HashMap<String, u64>,
    pub by_category: HashMap<String, u64>,
    pub by_pipeline: HashMap<String, u64>,
    pub local_errors: u64,
    pub server_errors: u64,
    pub action_counts: HashMap<String, u64>,
    pub avg_processing_time_ms: f64,
    pub last_error_at: Option<chrono::DateTime<Utc>>,
}

struct ErrorMetrics {
    snapshot: ErrorMetricsSnapshot,
    ring: VecDeque<PipelineError>,
    ring_capacity: usize,
}

impl ErrorMetrics {
    fn new(ring_capacity: usize) -> Self {
        Self { snapshot: ErrorMetricsSnapshot::default(), ring: VecDeque::new(), ring_capacity }
    }

    fn record(&mut self, error: &PipelineError, phase: Phase, processing_time_ms: u64) {
        *self.snapshot.by_code.entry(format!("{:?}", error.code)).or_insert(0) += 1;
        *self.snapshot.by_category.entry(error.category.to_string()).or_insert(0) += 1;
        if let Some(pid) = &error.pipeline_id {
            *self.snapshot.by_pipeline.entry(pid.clone()).or_insert(0) += 1;
        }
        match phase {
            Phase::Server => self.snapshot.server_errors += 1,
            Phase::Send | Phase::Receive => self.snapshot.local_errors += 1,
        }

        const ALPHA: f64 = 0.1;
        self.snapshot.avg_processing_time_ms = if self.snapshot.avg_processing_time_ms == 0.0 {
            processing_time_ms as f64
        } else {
            ALPHA * processing_time_ms as f64 + (1.0 - ALPHA) * self.snapshot.avg_processing_time_ms
        };
        self.snapshot.last_error_at = Some(Utc::now());

        if self.ring.len() >= self.ring_capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(error.clone());
    }

    fn record_action(&mut self, action: &RecoveryAction) {
        let key = match action {
            RecoveryAction::Retry { .. } => "retry",
            RecoveryAction::Failover { .. } => "failover",
            RecoveryAction::BlacklistTemporary { .. } => "blacklist_temporary",
            RecoveryAction::BlacklistPermanent => "blacklist_permanent",
            RecoveryAction::EnterMaintenance => "enter_maintenance",
            RecoveryAction::Ignore => "ignore",
        };
        *self.snapshot.action_counts.entry(key.to_string()).or_insert(0) += 1;
    }

    /// Drop ring entries older than `max_age`.
    fn cleanup(&mut self, now: chrono::DateTime<Utc>, max_age: chrono::Duration) {
        while let Some(front) = self.ring.front() {
            if now.signed_duration_since(front.timestamp) > max_age {
                self.ring.pop_front();
            } else {
                break;
            }
        }
    }
}

pub struct EnhancedErrorResponseCenter {
    config: ErrorResponseConfig,
    handlers: Mutex<HandlerRegistry>,
    metrics: Mutex<ErrorMetrics>,
    sink: Arc<dyn MessageSink>,
}

impl EnhancedErrorResponseCenter {
    pub fn new(config: ErrorResponseConfig, sink: Arc<dyn MessageSink>) -> Self {
        let ring_capacity = config.max_error_history_size;
        Self {
            config,
            handlers: Mutex::new(HandlerRegistry::default()),
            metrics: Mutex::new(ErrorMetrics::new(ring_capacity)),
            sink,
        }
    }

    pub fn register_handler(&self, code: ErrorCode, priority: i32, handler: Arc<dyn CustomHandler>) {
        self.handlers.lock().register(code, priority, handler);
    }

    pub async fn handle_local_send(
        &self,
        error: PipelineError,
        ctx: &ExecutionContext,
        history: InstanceFailureHistory,
        retry_delay_override: Option<Duration>,
    ) -> ErrorResponse {
        self.handle(error, ctx, history, retry_delay_override, Phase::Send).await
    }

    pub async fn handle_local_receive(
        &self,
        error: PipelineError,
        ctx: &ExecutionContext,
        history: InstanceFailureHistory,
        retry_delay_override: Option<Duration>,
    ) -> ErrorResponse {
        self.handle(error, ctx, history, retry_delay_override, Phase::Receive).await
    }

    pub async fn handle_server(
        &self,
        error: PipelineError,
        ctx: &ExecutionContext,
        history: InstanceFailureHistory,
        retry_delay_override: Option<Duration>,
    ) -> ErrorResponse {
        self.handle(error, ctx, history, retry_delay_override, Phase::Server).await
    }

    async fn handle(
        &self,
        error: PipelineError,
        ctx: &ExecutionContext,
        history: InstanceFailureHistory,
        retry_delay_override: Option<Duration>,
        expected_phase: Phase,
    ) -> ErrorResponse {
        let started = std::time::Instant::now();
        let phase = classify_phase(&error);
        debug_assert!(
            phase == expected_phase || expected_phase == Phase::Server,
            "entry point phase mismatched classified phase"
        );

        let response = match self.try_custom_handlers(&error, ctx).await {
            Some(mut response) => {
                response.phase = phase;
                response.http_status = http_status(error.code, phase);
                response
            }
            None => self.fallback_response(&error, ctx, history, retry_delay_override, phase),
        };

        if let Some(action) = response.recovery_action.clone() {
            self.dispatch_recovery_action(action, &response.pipeline_id).await;
        }

        let mut metrics = self.metrics.lock();
        metrics.record(&error, phase, started.elapsed().as_millis() as u64);
        if let Some(action) = &response.recovery_action {
            metrics.record_action(action);
        }

        response
    }

    async fn try_custom_handlers(
        &self,
        error: &PipelineError,
        ctx: &ExecutionContext,
    ) -> Option<ErrorResponse> {
        let handlers: Vec<Arc<dyn CustomHandler>> = {
            let registry = self.handlers.lock();
            registry.get(error.code).iter().map(|h| h.handler.clone()).collect()
        };

        for handler in handlers {
            match handler.handle(error, ctx).await {
                Some(response) => return Some(response),
                None => warn!(code = ?error.code, "custom error handler declined, trying next"),
            }
        }
        None
    }

    fn fallback_response(
        &self,
        error: &PipelineError,
        ctx: &ExecutionContext,
        history: InstanceFailureHistory,
        retry_delay_override: Option<Duration>,
        phase: Phase,
    ) -> ErrorResponse {
        let decision = recovery_policy::decide(error.code, ctx.retry_count, history, retry_delay_override);
        ErrorResponse {
            success: false,
            http_status: http_status(error.code, phase),
            code: error.code,
            category: error.category,
            severity: error.severity,
            message: error.details.clone(),
            phase,
            timestamp: Utc::now(),
            details: error.details.clone(),
            pipeline_id: error.pipeline_id.clone(),
            instance_id: error.instance_id.clone(),
            recovery_action: Some(decision.action),
        }
    }

    /// Dispatch the recovery action asynchronously under
    /// `recoveryActionTimeout`; failures are logged but never replace the
    /// response already returned to the caller.
    async fn dispatch_recovery_action(&self, action: RecoveryAction, pipeline_id: &Option<String>) {
        let Some(pipeline_id) = pipeline_id.clone() else { return };
        let sink = self.sink.clone();
        let timeout = self.config.recovery_action_timeout;

        let event = match &action {
            RecoveryAction::Retry { delay } => {
                Some(SchedulerEvent::RetryRequested { pipeline_id: pipeline_id.clone(), delay: *delay })
            }
            RecoveryAction::Failover { next_pipeline_id } => Some(SchedulerEvent::FailoverRequested {
                pipeline_id: pipeline_id.clone(),
                instance_id: next_pipeline_id.clone(),
            }),
            RecoveryAction::EnterMaintenance => {
                Some(SchedulerEvent::MaintenanceRequested { pipeline_id: pipeline_id.clone() })
            }
            RecoveryAction::BlacklistTemporary { .. } | RecoveryAction::BlacklistPermanent => {
                Some(SchedulerEvent::MaintenanceRequested { pipeline_id: pipeline_id.clone() })
            }
            RecoveryAction::Ignore => None,
        };

        let Some(event) = event else { return };

        let dispatch = async move { sink.send(event).await };
        if tokio::time::timeout(timeout, dispatch).await.is_err() {
            error!(pipeline_id = %pipeline_id, ?timeout, "recovery action dispatch timed out");
        }
    }

    pub fn metrics_snapshot(&self) -> ErrorMetricsSnapshot {
        self.metrics.lock().snapshot.clone()
    }

    /// Periodic sweep of the error ring buffer: entries older than
    /// `error_cleanup_interval` are dropped.
    pub fn cleanup_ring(&self) {
        let now = Utc::now();
        let max_age = chrono::Duration::from_std(self.config.error_cleanup_interval)
            .unwrap_or_else(|_| chrono::Duration::milliseconds(i64::MAX / 2));
        self.metrics.lock().cleanup(now, max_age);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_common::types::{ExecutionId, InstanceId, PipelineId};
    use scheduler_common::Payload;

    struct NoopSink;
    #[async_trait]
    impl MessageSink for NoopSink {
        async fn send(&self, _event: SchedulerEvent) {}
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            execution_id: ExecutionId::new_v4(),
            pipeline_id: PipelineId::from("p1"),
            instance_id: None as Option<InstanceId>,
            start_time: Utc::now(),
            timeout: Duration::from_secs(5),
            payload: Payload::new(Vec::new()),
            metadata: HashMap::new(),
            retry_count: 0,
            max_retries: 3,
        }
    }

    #[tokio::test]
    async fn send_phase_error_maps_to_500_with_retry_action() {
        let center =
            EnhancedErrorResponseCenter::new(ErrorResponseConfig::default(), Arc::new(NoopSink));
        let error = PipelineError::new(ErrorCode::ConnectionFailed, "refused").with_pipeline("p1");
        let response = center
            .handle_local_send(error, &ctx(), InstanceFailureHistory::default(), None)
            .await;
        assert_eq!(response.http_status, 500);
        assert_eq!(response.phase, Phase::Send);
        assert!(matches!(response.recovery_action, Some(RecoveryAction::Retry { .. })));
    }

    #[tokio::test]
    async fn server_auth_failure_maps_to_401_with_maintenance() {
        let center =
            EnhancedErrorResponseCenter::new(ErrorResponseConfig::default(), Arc::new(NoopSink));
        let error = PipelineError::new(ErrorCode::AuthenticationFailed, "bad token").with_pipeline("p1");
        let response = center
            .handle_server(error, &ctx(), InstanceFailureHistory::default(), None)
            .await;
        assert_eq!(response.http_status, 401);
        assert!(matches!(response.recovery_action, Some(RecoveryAction::EnterMaintenance)));
    }

    #[tokio::test]
    async fn custom_handler_overrides_the_policy_fallback() {
        let center =
            EnhancedErrorResponseCenter::new(ErrorResponseConfig::default(), Arc::new(NoopSink));

        struct AlwaysIgnore;
        #[async_trait]
        impl CustomHandler for AlwaysIgnore {
            async fn handle(&self, error: &PipelineError, _ctx: &ExecutionContext) -> Option<ErrorResponse> {
                Some(ErrorResponse {
                    success: false,
                    http_status: 500,
                    code: error.code,
                    category: error.category,
                    severity: error.severity,
                    message: "custom".into(),
                    phase: Phase::Send,
                    timestamp: Utc::now(),
                    details: "custom".into(),
                    pipeline_id: error.pipeline_id.clone(),
                    instance_id: None,
                    recovery_action: Some(RecoveryAction::Ignore),
                })
            }
        }

        center.register_handler(ErrorCode::ExecutionFailed, 10, Arc::new(AlwaysIgnore));
        let error = PipelineError::new(ErrorCode::ExecutionFailed, "boom").with_pipeline("p1");
        let response = center
            .handle_local_send(error, &ctx(), InstanceFailureHistory::default(), None)
            .await;
        assert_eq!(response.message, "custom");
        assert!(matches!(response.recovery_action, Some(RecoveryAction::Ignore)));
    }
}
