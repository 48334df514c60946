//! Core data types shared by every scheduler component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a single `execute` call.
pub type ExecutionId = Uuid;

/// Stable identifier for a pipeline descriptor.
pub type PipelineId = String;

/// Identifier for one instance of a pipeline.
pub type InstanceId = String;

/// Opaque request payload: transform-agnostic bytes plus caller metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub bytes: Vec<u8>,
    pub metadata: HashMap<String, String>,
}

impl Payload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A pipeline descriptor, immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDescriptor {
    pub id: PipelineId,
    pub name: String,
    pub pipeline_type: String,
    pub enabled: bool,
    pub priority: u32,
    pub weight: u32,
    pub timeout: Option<Duration>,
    pub max_concurrency: Option<u32>,
}

impl PipelineDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, pipeline_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            pipeline_type: pipeline_type.into(),
            enabled: true,
            priority: 0,
            weight: 1,
            timeout: None,
            max_concurrency: None,
        }
    }
}

/// Circuit breaker state, tracked per provider or instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Lifecycle state of a pipeline instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InstanceState {
    Uninitialized,
    Ready,
    Draining,
    Stopped,
    Error,
}

/// Context propagated through a single execution attempt, including retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub pipeline_id: PipelineId,
    pub instance_id: Option<InstanceId>,
    pub start_time: DateTime<Utc>,
    pub timeout: Duration,
    pub payload: Payload,
    pub metadata: HashMap<String, String>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl ExecutionContext {
    /// True once `now` is at or past `start_time + timeout`.
    pub fn deadline_exceeded(&self, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(self.start_time).to_std() {
            Ok(elapsed) => elapsed >= self.timeout,
            Err(_) => false,
        }
    }
}

/// Outcome status of an execution attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionStatus {
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

/// Result of a complete `execute` call, after retries/failover are resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    pub pipeline_id: PipelineId,
    pub instance_id: Option<InstanceId>,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: Duration,
    pub error: Option<PipelineError>,
    pub retry_count: u32,
    pub output: Option<Payload>,
}

/// Severity of a `PipelineError`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Whether a failure can be recovered from without operator intervention.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Recoverability {
    Recoverable,
    NonRecoverable,
}

/// Blast radius of a failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Impact {
    SingleModule,
    Pipeline,
    SystemWide,
}

/// Where a failure originated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorSource {
    Module,
    Upstream,
}

/// The closed set of error codes the scheduler understands. Kinds, not
/// free-form strings, so classification (§ErrorClassifier) is total.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Scheduling
    NoAvailablePipelines,
    PipelineSelectionFailed,
    CircuitOpen,
    SchedulerShuttingDown,
    // Execution (local)
    ExecutionFailed,
    ExecutionTimeout,
    InternalError,
    SystemOverload,
    // Network (local, transport)
    ConnectionFailed,
    RequestTimeout,
    ResponseTimeout,
    // Authn/authz (server)
    AuthenticationFailed,
    AuthorizationFailed,
    // Upstream server
    RateLimited,
    ServiceUnavailable,
    ServerError,
    Timeout,
    Unknown,
}

/// A structured failure flowing from a pipeline instance (or the scheduler
/// itself) into the error classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineError {
    pub code: ErrorCode,
    pub category: &'static str,
    pub severity: Severity,
    pub recoverability: Recoverability,
    pub impact: Impact,
    pub source: ErrorSource,
    pub pipeline_id: Option<PipelineId>,
    pub instance_id: Option<InstanceId>,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

impl PipelineError {
    pub fn new(code: ErrorCode, details: impl Into<String>) -> Self {
        let (category, severity, recoverability, impact, source) = code.defaults();
        Self {
            code,
            category,
            severity,
            recoverability,
            impact,
            source,
            pipeline_id: None,
            instance_id: None,
            timestamp: Utc::now(),
            details: details.into(),
        }
    }

    pub fn with_pipeline(mut self, pipeline_id: impl Into<String>) -> Self {
        self.pipeline_id = Some(pipeline_id.into());
        self
    }

    pub fn with_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }
}

impl ErrorCode {
    /// Baseline classification used when constructing a `PipelineError` from
    /// scratch. Callers may still override individual fields.
    fn defaults(self) -> (&'static str, Severity, Recoverability, Impact, ErrorSource) {
        use ErrorCode::*;
        match self {
            NoAvailablePipelines | PipelineSelectionFailed | SchedulerShuttingDown => (
                "scheduling",
                Severity::High,
                Recoverability::NonRecoverable,
                Impact::SystemWide,
                ErrorSource::Module,
            ),
            CircuitOpen => (
                "scheduling",
                Severity::Medium,
                Recoverability::Recoverable,
                Impact::Pipeline,
                ErrorSource::Module,
            ),
            ExecutionFailed | InternalError => (
                "execution",
                Severity::Medium,
                Recoverability::Recoverable,
                Impact::SingleModule,
                ErrorSource::Module,
            ),
            ExecutionTimeout | SystemOverload => (
                "execution",
                Severity::Medium,
                Recoverability::Recoverable,
                Impact::Pipeline,
                ErrorSource::Module,
            ),
            ConnectionFailed | RequestTimeout | ResponseTimeout => (
                "network",
                Severity::Medium,
                Recoverability::Recoverable,
                Impact::Pipeline,
                ErrorSource::Module,
            ),
            AuthenticationFailed | AuthorizationFailed => (
                "auth",
                Severity::Critical,
                Recoverability::NonRecoverable,
                Impact::Pipeline,
                ErrorSource::Upstream,
            ),
            RateLimited | ServiceUnavailable | ServerError | Timeout | Unknown => (
                "upstream",
                Severity::Medium,
                Recoverability::Recoverable,
                Impact::Pipeline,
                ErrorSource::Upstream,
            ),
        }
    }
}

/// Where in the request lifecycle a failure occurred.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Phase {
    Send,
    Receive,
    Server,
}

/// The scheduler's next move after a failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RecoveryAction {
    Retry { delay: Duration },
    Failover { next_pipeline_id: Option<PipelineId> },
    BlacklistTemporary { duration: Duration },
    BlacklistPermanent,
    EnterMaintenance,
    Ignore,
}

/// Client-facing description of a failure and what the scheduler did about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub http_status: u16,
    pub code: ErrorCode,
    pub category: &'static str,
    pub severity: Severity,
    pub message: String,
    pub phase: Phase,
    pub timestamp: DateTime<Utc>,
    pub details: String,
    pub pipeline_id: Option<PipelineId>,
    pub instance_id: Option<InstanceId>,
    pub recovery_action: Option<RecoveryAction>,
}

/// Per-provider rolling health snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub is_healthy: bool,
    pub last_probe: Option<DateTime<Utc>>,
    pub rolling_response_time_ms: f64,
    pub error_rate: f64,
    pub consecutive_failures: u32,
    pub total_requests: u64,
    pub total_failures: u64,
    pub average_response_time_ms: f64,
    pub last_used: Option<DateTime<Utc>>,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            is_healthy: true,
            last_probe: None,
            rolling_response_time_ms: 0.0,
            error_rate: 0.0,
            consecutive_failures: 0,
            total_requests: 0,
            total_failures: 0,
            average_response_time_ms: 0.0,
            last_used: None,
        }
    }
}

/// A timed or permanent exclusion of a (pipeline, instance) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub pipeline_id: PipelineId,
    pub instance_id: Option<InstanceId>,
    pub cause: ErrorCode,
    pub until: Option<DateTime<Utc>>,
    pub permanent: bool,
    pub entered_at: DateTime<Utc>,
}

impl BlacklistEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.permanent {
            return false;
        }
        match self.until {
            Some(until) => now >= until,
            None => false,
        }
    }
}
