//! Load-balancing strategies (C3) and the pipeline blacklist (C4).

pub mod balancer;
pub mod blacklist;

pub use balancer::{AdaptiveThresholds, Candidate, LoadBalancer};
pub use blacklist::{BlacklistEvent, BlacklistManager};

