//! Optional execution optimizer (C8): a request-fingerprint result cache
//! and a concurrency-limiting semaphore, both independently toggled by
//! `scheduler_common::config::OptimizerConfig`.

pub mod cache;
pub mod concurrency;
pub mod optimizer;

pub use cache::RequestCache;
pub use concurrency::ConcurrencyLimiter;
pub use optimizer::RequestOptimizer;
