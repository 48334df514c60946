//! The Scheduler (C7): the top-level orchestrator that selects a pipeline,
//! executes under a deadline, and drives retry/failover/blacklist/maintenance
//! from the error-response subsystem's recovery decisions.

pub mod scheduler;

pub use scheduler::{ExecuteOptions, PipelineStatusSnapshot, Scheduler, SchedulerStatsSnapshot};
