//! Error types for the scheduler's own plumbing (construction, lifecycle,
//! configuration). Per-request failures flow through [`crate::types::PipelineError`]
//! instead, since they need the richer taxonomy the classifier consumes.

use thiserror::Error;

/// Result type alias for scheduler-internal operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by scheduler setup and administrative operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    #[error("pipeline not found: {0}")]
    NotFound(String),

    #[error("pipeline already exists: {0}")]
    AlreadyExists(String),

    #[error("no available pipelines")]
    NoAvailablePipelines,

    #[error("pipeline selection failed: {0}")]
    PipelineSelectionFailed(String),

    #[error("circuit open for {0}")]
    CircuitOpen(String),

    #[error("scheduler is shutting down")]
    SchedulerShuttingDown,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::CircuitOpen(_))
    }

    pub fn category(&self) -> &'static str {
        match self {
            Error::InitializationFailed(_) => "initialization",
            Error::NotFound(_) => "not_found",
            Error::AlreadyExists(_) => "already_exists",
            Error::NoAvailablePipelines => "scheduling",
            Error::PipelineSelectionFailed(_) => "scheduling",
            Error::CircuitOpen(_) => "scheduling",
            Error::SchedulerShuttingDown => "lifecycle",
            Error::Configuration(_) => "configuration",
            Error::Serialization(_) => "serialization",
            Error::Generic(_) => "generic",
        }
    }
}
