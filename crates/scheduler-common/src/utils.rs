//! Small free-function helpers shared by the scheduler crates.

use chrono::{DateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a fresh execution id.
pub fn generate_execution_id() -> Uuid {
    Uuid::new_v4()
}

/// Current timestamp.
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Current timestamp as milliseconds since epoch.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Deterministic exponential backoff: `base * multiplier^attempt`, capped.
/// No jitter — recovery-policy scenarios pin exact delay values.
pub fn exponential_backoff_ms(attempt: u32, base_ms: u64, multiplier: f64, max_ms: u64) -> u64 {
    let delay = base_ms as f64 * multiplier.powi(attempt as i32);
    (delay as u64).min(max_ms)
}

/// Stable hash for request-fingerprint caching.
pub fn simple_hash(bytes: &[u8]) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}
