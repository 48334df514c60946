//! RecoveryPolicy (C5, second half): maps a classified error plus its
//! execution/instance history to a `RecoveryAction`, a `shouldRetry` flag,
//! and (if retrying) a delay. Grounded on the source's backoff-by-category
//! dispatch, adapted to `scheduler_common::utils::exponential_backoff_ms`'s
//! deterministic (jitter-free) curve.

use std::time::Duration;

use scheduler_common::utils::exponential_backoff_ms;
use scheduler_common::{ErrorCode, RecoveryAction};

/// Per-instance failure history the policy needs to decide failover vs.
/// blacklist vs. plain retry. The scheduler owns and updates this; the
/// policy only reads it.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceFailureHistory {
    pub consecutive_failures_this_instance: u32,
    pub blacklist_threshold: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct PolicyDecision {
    pub action: RecoveryAction,
    pub should_retry: bool,
}

const DEFAULT_BLACKLIST_THRESHOLD: u32 = 5;
const BLACKLIST_DURATION_MS: u64 = 60_000;

/// Decide the recovery action for `code`, given the retry attempt number
/// (0-indexed, i.e. the attempt about to be made) and the instance's recent
/// failure history. `retry_delay_override` honors a caller-supplied
/// `retryDelay` execute option, taking precedence over the computed backoff
/// for `Retry` decisions only.
pub fn decide(
    code: ErrorCode,
    attempt: u32,
    history: InstanceFailureHistory,
    retry_delay_override: Option<Duration>,
) -> PolicyDecision {
    let blacklist_threshold = if history.blacklist_threshold > 0 {
        history.blacklist_threshold
    } else {
        DEFAULT_BLACKLIST_THRESHOLD
    };

    // An auth failure normally just parks the instance in maintenance for a
    // human to fix. If it keeps failing auth past `blacklist_threshold`
    // (i.e. it was already cycled through maintenance and still can't
    // authenticate), that's not transient — permanently exclude it instead
    // of cycling through maintenance again.
    if matches!(code, ErrorCode::AuthenticationFailed | ErrorCode::AuthorizationFailed)
        && history.consecutive_failures_this_instance >= blacklist_threshold
    {
        return PolicyDecision { action: RecoveryAction::BlacklistPermanent, should_retry: false };
    }

    if history.consecutive_failures_this_instance >= blacklist_threshold {
        return PolicyDecision {
            action: RecoveryAction::BlacklistTemporary { duration: Duration::from_millis(BLACKLIST_DURATION_MS) },
            should_retry: true,
        };
    }

    match code {
        ErrorCode::AuthenticationFailed | ErrorCode::AuthorizationFailed => PolicyDecision {
            action: RecoveryAction::EnterMaintenance,
            should_retry: false,
        },

        ErrorCode::ConnectionFailed if history.consecutive_failures_this_instance >= 2 => {
            PolicyDecision { action: RecoveryAction::Failover { next_pipeline_id: None }, should_retry: true }
        }

        ErrorCode::RateLimited => {
            let delay = retry_delay_override
                .unwrap_or_else(|| Duration::from_millis(exponential_backoff_ms(attempt, 2_000, 2, 60_000)));
            PolicyDecision { action: RecoveryAction::Retry { delay }, should_retry: true }
        }

        ErrorCode::ConnectionFailed
        | ErrorCode::RequestTimeout
        | ErrorCode::ResponseTimeout
        | ErrorCode::ExecutionFailed
        | ErrorCode::ExecutionTimeout
        | ErrorCode::ServiceUnavailable
        | ErrorCode::ServerError
        | ErrorCode::Timeout
        | ErrorCode::SystemOverload
        | ErrorCode::InternalError => {
            let delay = retry_delay_override
                .unwrap_or_else(|| Duration::from_millis(exponential_backoff_ms(attempt, 1_000, 2, 30_000)));
            PolicyDecision { action: RecoveryAction::Retry { delay }, should_retry: true }
        }

        _ => PolicyDecision { action: RecoveryAction::Ignore, should_retry: false },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failure_enters_maintenance_without_retry() {
        let d = decide(ErrorCode::AuthenticationFailed, 0, InstanceFailureHistory::default(), None);
        assert!(matches!(d.action, RecoveryAction::EnterMaintenance));
        assert!(!d.should_retry);
    }

    #[test]
    fn auth_failure_past_blacklist_threshold_is_permanently_excluded() {
        let history = InstanceFailureHistory { consecutive_failures_this_instance: 5, blacklist_threshold: 5 };
        let d = decide(ErrorCode::AuthenticationFailed, 0, history, None);
        assert!(matches!(d.action, RecoveryAction::BlacklistPermanent));
        assert!(!d.should_retry);
    }

    #[test]
    fn connection_failed_after_two_consecutive_failures_fails_over() {
        let history = InstanceFailureHistory { consecutive_failures_this_instance: 2, blacklist_threshold: 0 };
        let d = decide(ErrorCode::ConnectionFailed, 0, history, None);
        assert!(matches!(d.action, RecoveryAction::Failover { .. }));
    }

    #[test]
    fn connection_failed_first_attempt_just_retries() {
        let d = decide(ErrorCode::ConnectionFailed, 0, InstanceFailureHistory::default(), None);
        assert!(matches!(d.action, RecoveryAction::Retry { .. }));
    }

    #[test]
    fn rate_limited_backs_off_with_base_2000_doubling() {
        let d0 = decide(ErrorCode::RateLimited, 0, InstanceFailureHistory::default(), None);
        let d1 = decide(ErrorCode::RateLimited, 1, InstanceFailureHistory::default(), None);
        match (d0.action, d1.action) {
            (RecoveryAction::Retry { delay: a }, RecoveryAction::Retry { delay: b }) => {
                assert_eq!(a, Duration::from_millis(2000));
                assert_eq!(b, Duration::from_millis(4000));
            }
            _ => panic!("expected Retry"),
        }
    }

    #[test]
    fn repeated_failure_past_threshold_blacklists() {
        let history = InstanceFailureHistory { consecutive_failures_this_instance: 5, blacklist_threshold: 5 };
        let d = decide(ErrorCode::ExecutionFailed, 0, history, None);
        assert!(matches!(
            d.action,
            RecoveryAction::BlacklistTemporary { duration } if duration == Duration::from_millis(60_000)
        ));
    }

    #[test]
    fn unknown_code_is_ignored() {
        let d = decide(ErrorCode::Unknown, 0, InstanceFailureHistory::default(), None);
        assert!(matches!(d.action, RecoveryAction::Ignore));
        assert!(!d.should_retry);
    }

    #[test]
    fn retry_delay_override_is_honored_verbatim() {
        let d = decide(
            ErrorCode::ConnectionFailed,
            0,
            InstanceFailureHistory::default(),
            Some(Duration::from_millis(10)),
        );
        assert!(matches!(d.action, RecoveryAction::Retry { delay } if delay == Duration::from_millis(10)));
    }

    #[test]
    fn retry_delay_override_does_not_affect_non_retry_actions() {
        let d = decide(
            ErrorCode::AuthenticationFailed,
            0,
            InstanceFailureHistory::default(),
            Some(Duration::from_millis(10)),
        );
        assert!(matches!(d.action, RecoveryAction::EnterMaintenance));
    }
}
