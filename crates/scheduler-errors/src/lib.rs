//! ErrorClassifier & RecoveryPolicy (C5) and the EnhancedErrorResponseCenter
//! (C6): classify a `PipelineError` into a phase and HTTP status, decide the
//! recovery action, and apply custom handler overrides.

pub mod classifier;
pub mod recovery_policy;
pub mod response_center;

pub use classifier::{classify_phase, http_status};
pub use recovery_policy::{decide, InstanceFailureHistory, PolicyDecision};
pub use response_center::{CustomHandler, EnhancedErrorResponseCenter, ErrorMetricsSnapshot};
