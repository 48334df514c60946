//! The pipeline-instance contract, plus the scheduler-to-collaborator
//! event/sink pair the response center uses to signal back without calling
//! the scheduler directly.

use async_trait::async_trait;

use crate::types::{ExecutionContext, ExecutionResult};

/// The black-box collaborator that actually executes a request. Its
/// internals (protocol framing, transforms, the upstream call) are out of
/// scope; the scheduler only ever sees this contract.
#[async_trait]
pub trait PipelineInstance: Send + Sync {
    async fn execute(&self, ctx: ExecutionContext) -> ExecutionResult;
    async fn health_probe(&self) -> bool;
}

/// A closed set of events the response center can hand to the scheduler.
/// Exhaustive dispatch replaces a string-keyed handler registry.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    RetryRequested { pipeline_id: String, delay: std::time::Duration },
    FailoverRequested { pipeline_id: String, instance_id: Option<String> },
    MaintenanceRequested { pipeline_id: String },
    Ping,
    HealthCheck,
    Shutdown,
}

/// Sink for `SchedulerEvent`s. The response center emits events; it never
/// calls the scheduler back directly, keeping ownership a DAG
/// (Scheduler -> {ResponseCenter, HealthTracker, BlacklistManager}).
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, event: SchedulerEvent);
}
