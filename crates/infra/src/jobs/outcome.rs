//! Per-call outcomes, consolidation of the two calls, and retry classification.
//!
//! Everything in here is pure: the consumer feeds it what the calls returned
//! and gets back what to persist and whether the message should be retried.

use std::time::Duration;

use serde_json::{Value as JsonValue, json};

use crate::downstream::{CallFailure, DownstreamReply, UNKNOWN_FAILURE_STATUS};

/// Error codes that are retried regardless of status.
pub const RETRYABLE_CODES: &[&str] = &["TimeoutError", "ECONNRESET", "ECONNREFUSED"];

/// Status of a consolidated success.
pub const CONSOLIDATED_OK_STATUS: u16 = 200;

/// What one downstream call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Succeeded(DownstreamReply),
    Failed(CallFailure),
    /// The call did not finish within the per-call timeout.
    TimedOut,
}

impl CallOutcome {
    fn failure(&self, side: &str) -> Option<CallFailure> {
        match self {
            CallOutcome::Succeeded(_) => None,
            CallOutcome::Failed(failure) => Some(failure.clone()),
            CallOutcome::TimedOut => Some(CallFailure::timeout(format!("service {side} timed out"))),
        }
    }

    fn payload(&self) -> JsonValue {
        match self {
            CallOutcome::Succeeded(reply) => reply.data.clone(),
            _ => JsonValue::Null,
        }
    }
}

/// Combined view of both calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Consolidated {
    pub ok: bool,
    pub http_status: u16,
    pub latency_ms: u64,
    /// `{a, b}` with `null` for a side that failed.
    pub payload: JsonValue,
    /// The failure that determined `http_status`, if any.
    pub failure: Option<CallFailure>,
}

/// Combine the outcomes of services A and B.
///
/// Success only if both succeed (status 200). Otherwise the status is the
/// larger of the two, a successful side counting with its own status and a
/// status-less failure counting as 500. The reported failure is the one
/// carrying that status (A on ties).
pub fn consolidate(a: &CallOutcome, b: &CallOutcome, latency: Duration) -> Consolidated {
    let payload = json!({ "a": a.payload(), "b": b.payload() });
    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);

    let fa = a.failure("A");
    let fb = b.failure("B");

    if fa.is_none() && fb.is_none() {
        return Consolidated {
            ok: true,
            http_status: CONSOLIDATED_OK_STATUS,
            latency_ms,
            payload,
            failure: None,
        };
    }

    let status_of = |outcome: &CallOutcome, failure: &Option<CallFailure>| match (outcome, failure) {
        (_, Some(f)) => f.http_status,
        (CallOutcome::Succeeded(reply), None) => reply.http_status,
        _ => UNKNOWN_FAILURE_STATUS,
    };
    let status_a = status_of(a, &fa);
    let status_b = status_of(b, &fb);

    let failure = match (fa, fb) {
        (Some(fa), Some(fb)) => {
            if fb.http_status > fa.http_status {
                fb
            } else {
                fa
            }
        }
        (Some(f), None) | (None, Some(f)) => f,
        (None, None) => CallFailure::internal("no failure recorded"),
    };

    Consolidated {
        ok: false,
        http_status: status_a.max(status_b),
        latency_ms,
        payload,
        failure: Some(failure),
    }
}

/// Whether a failure is worth another delivery: server errors, throttling, or
/// a connection-level code.
pub fn is_retryable(http_status: u16, code: Option<&str>) -> bool {
    http_status >= 500
        || http_status == 429
        || code.is_some_and(|c| RETRYABLE_CODES.contains(&c))
}

/// What the worker should do with a processed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Remove from the queue (success or permanent failure).
    Acknowledge,
    /// Leave for redelivery.
    Retry,
}

/// Maps a consolidated failure to a disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailurePolicy {
    /// Configuration errors are permanent unless this is set.
    pub retry_configuration_errors: bool,
}

impl FailurePolicy {
    pub fn disposition(&self, consolidated: &Consolidated) -> Disposition {
        let Some(failure) = consolidated.failure.as_ref() else {
            return Disposition::Acknowledge;
        };
        if failure.is_configuration() {
            return if self.retry_configuration_errors {
                Disposition::Retry
            } else {
                Disposition::Acknowledge
            };
        }
        if is_retryable(consolidated.http_status, failure.code.as_deref()) {
            Disposition::Retry
        } else {
            Disposition::Acknowledge
        }
    }
}
