//! Pipeline scheduler: a load-balancing, health-tracking, circuit-breaking
//! scheduling and error-response engine fronting a pool of equivalent
//! processing pipelines.

#![warn(clippy::all)]

pub use scheduler_common::config::{
    CircuitBreakerSettings, ErrorResponseConfig, LoadBalancerConfig, LoadBalancingStrategy,
    OptimizerConfig, SchedulerConfig, SchedulerCoreConfig,
};
pub use scheduler_common::{
    BlacklistEntry, CircuitState, ComponentHealth, Error, ErrorCode, ExecutionContext,
    ExecutionResult, ExecutionStatus, HealthLevel, HealthSnapshot, HealthStatus, InstanceState,
    MessageSink, Payload, PipelineDescriptor, PipelineError, PipelineInstance, RecoveryAction,
    Result, SchedulerEvent, Severity,
};
pub use scheduler_core::{ExecuteOptions, PipelineStatusSnapshot, Scheduler, SchedulerStatsSnapshot};
pub use scheduler_errors::{CustomHandler, EnhancedErrorResponseCenter, ErrorMetricsSnapshot};
