//! ErrorClassifier (C5, first half): phase classification and the
//! code -> HTTP status mapping. Both are pure functions of `ErrorCode` so
//! classifying the same error twice always yields the same
//! `(phase, httpStatus)` pair (the "mapping idempotence" law in §8).

use scheduler_common::{ErrorCode, Phase, PipelineError};

/// Codes considered local (scheduler-side or transport send/receive).
const LOCAL_CODES: &[ErrorCode] = &[
    ErrorCode::ExecutionFailed,
    ErrorCode::ExecutionTimeout,
    ErrorCode::ConnectionFailed,
    ErrorCode::RequestTimeout,
    ErrorCode::ResponseTimeout,
    ErrorCode::InternalError,
    ErrorCode::SystemOverload,
];

/// Within the local set, codes surfaced as the send phase.
const SEND_PHASE_CODES: &[ErrorCode] = &[
    ErrorCode::ExecutionFailed,
    ErrorCode::ConnectionFailed,
    ErrorCode::RequestTimeout,
    ErrorCode::InternalError,
];

fn is_local(code: ErrorCode) -> bool {
    LOCAL_CODES.contains(&code)
}

fn is_send_phase(code: ErrorCode) -> bool {
    SEND_PHASE_CODES.contains(&code)
}

/// Classify a `PipelineError` into the phase it happened in.
///
/// `ConnectionFailed` is always local/send-phase here: this resolves the
/// source's ambiguous dual listing (local send-phase set *and* the server
/// status table) by never surfacing it as an upstream-reported error — a
/// connection refused before or during send is always ours to explain, never
/// the server's. The `ConnectionFailed -> 502` row in the server status
/// table below is therefore unreachable for this code; it is kept for
/// documentation parity with the source's table and would only apply if a
/// future error source ever reported `ConnectionFailed` as upstream-origin.
pub fn classify_phase(error: &PipelineError) -> Phase {
    if is_local(error.code) {
        if is_send_phase(error.code) {
            Phase::Send
        } else {
            Phase::Receive
        }
    } else {
        Phase::Server
    }
}

/// Map `(code, phase)` to the bit-exact HTTP status the caller sees.
pub fn http_status(code: ErrorCode, phase: Phase) -> u16 {
    match phase {
        Phase::Send => 500,
        Phase::Receive => 501,
        Phase::Server => match code {
            ErrorCode::AuthenticationFailed => 401,
            ErrorCode::AuthorizationFailed => 403,
            ErrorCode::ConnectionFailed => 502,
            ErrorCode::Timeout => 504,
            ErrorCode::RateLimited => 429,
            ErrorCode::ServerError => 500,
            ErrorCode::ServiceUnavailable => 503,
            _ => 500,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(code: ErrorCode) -> PipelineError {
        PipelineError::new(code, "boom")
    }

    #[test]
    fn connection_failed_is_always_send_phase_500() {
        let e = err(ErrorCode::ConnectionFailed);
        let phase = classify_phase(&e);
        assert_eq!(phase, Phase::Send);
        assert_eq!(http_status(e.code, phase), 500);
    }

    #[test]
    fn execution_timeout_is_receive_phase_501() {
        let e = err(ErrorCode::ExecutionTimeout);
        let phase = classify_phase(&e);
        assert_eq!(phase, Phase::Receive);
        assert_eq!(http_status(e.code, phase), 501);
    }

    #[test]
    fn authentication_failed_is_server_401() {
        let e = err(ErrorCode::AuthenticationFailed);
        let phase = classify_phase(&e);
        assert_eq!(phase, Phase::Server);
        assert_eq!(http_status(e.code, phase), 401);
    }

    #[test]
    fn unmapped_server_code_defaults_to_500() {
        let e = err(ErrorCode::Unknown);
        let phase = classify_phase(&e);
        assert_eq!(phase, Phase::Server);
        assert_eq!(http_status(e.code, phase), 500);
    }

    #[test]
    fn classification_is_idempotent() {
        let e = err(ErrorCode::RateLimited);
        let p1 = classify_phase(&e);
        let p2 = classify_phase(&e);
        assert_eq!(p1, p2);
        assert_eq!(http_status(e.code, p1), http_status(e.code, p2));
    }
}
