//! Downstream services called by the consumer.
//!
//! Each job is sent to two services ("A" and "B") with the same request. A
//! client either returns a reply or a `CallFailure` carrying an HTTP-like
//! status and an optional error code; timeouts are applied by the caller.

pub mod http;

use serde::Serialize;
use serde_json::Value as JsonValue;

use dayspread_core::CorrelationId;

pub use http::HttpDownstream;

/// Status recorded for failures that never produced an HTTP status.
pub const UNKNOWN_FAILURE_STATUS: u16 = 500;

/// Body sent to both services.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownstreamRequest {
    pub correlation_id: CorrelationId,
    pub endpoint: String,
    pub body: JsonValue,
}

/// A successful call.
#[derive(Debug, Clone, PartialEq)]
pub struct DownstreamReply {
    pub http_status: u16,
    pub data: JsonValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The client is not usable as configured (e.g. no base URL).
    Configuration,
    /// The request did not complete in time.
    Timeout,
    /// Connection-level failure.
    Transport,
    /// The service answered with a failure.
    Application,
    /// The call task itself failed (panicked or was cancelled).
    Internal,
}

/// A failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFailure {
    pub kind: FailureKind,
    pub http_status: u16,
    pub code: Option<String>,
    pub message: String,
}

impl CallFailure {
    pub const CONFIG_ERROR: &'static str = "ConfigError";
    pub const TIMEOUT_ERROR: &'static str = "TimeoutError";

    pub fn configuration(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Configuration,
            http_status: UNKNOWN_FAILURE_STATUS,
            code: Some(Self::CONFIG_ERROR.to_string()),
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Timeout,
            http_status: UNKNOWN_FAILURE_STATUS,
            code: Some(Self::TIMEOUT_ERROR.to_string()),
            message: message.into(),
        }
    }

    pub fn transport(code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transport,
            http_status: UNKNOWN_FAILURE_STATUS,
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn application(http_status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Application,
            http_status,
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Internal,
            http_status: UNKNOWN_FAILURE_STATUS,
            code: None,
            message: message.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind == FailureKind::Configuration
    }
}

impl core::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({}, status {})", self.message, code, self.http_status),
            None => write!(f, "{} (status {})", self.message, self.http_status),
        }
    }
}

/// One downstream service.
#[async_trait::async_trait]
pub trait DownstreamClient: Send + Sync {
    /// Short name used in logs ("A", "B").
    fn name(&self) -> &str;

    async fn call(&self, request: &DownstreamRequest) -> Result<DownstreamReply, CallFailure>;
}
