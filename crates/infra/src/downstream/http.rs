//! HTTP downstream client.
//!
//! POSTs `{correlationId, endpoint, body}` as JSON to `{base}{path}` with an
//! optional `x-api-key` header. Services answer with an envelope
//! `{ok, httpStatus, data, error: {message, code}}`; every field is optional:
//!
//! - missing `ok` falls back to whether the transport status is 2xx
//! - missing `httpStatus` falls back to the transport status
//! - missing `data` falls back to the whole document
//! - a body that is not JSON is read as `{}`

use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use super::{CallFailure, DownstreamClient, DownstreamReply, DownstreamRequest};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone)]
pub struct HttpDownstream {
    name: String,
    client: reqwest::Client,
    base_url: Option<String>,
    path: String,
    api_key: Option<String>,
}

impl HttpDownstream {
    /// `base_url` may be absent: every call then fails with a configuration
    /// error instead of the client refusing to start.
    pub fn new(
        name: impl Into<String>,
        client: reqwest::Client,
        base_url: Option<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            base_url,
            path: path.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn url(&self) -> Result<String, CallFailure> {
        let base = self
            .base_url
            .as_deref()
            .map(|b| b.trim_end_matches('/'))
            .filter(|b| !b.is_empty())
            .ok_or_else(|| CallFailure::configuration("INTERNAL_API_URL not set"))?;
        if self.path.starts_with('/') {
            Ok(format!("{base}{}", self.path))
        } else {
            Ok(format!("{base}/{}", self.path))
        }
    }
}

#[async_trait::async_trait]
impl DownstreamClient for HttpDownstream {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, request: &DownstreamRequest) -> Result<DownstreamReply, CallFailure> {
        let url = self.url()?;

        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }

        let response = builder.send().await.map_err(classify_transport_error)?;
        let transport_status = response.status();
        let bytes = response.bytes().await.map_err(classify_transport_error)?;
        let document: JsonValue =
            serde_json::from_slice(&bytes).unwrap_or_else(|_| JsonValue::Object(Map::new()));

        debug!(
            service = %self.name,
            correlation_id = %request.correlation_id,
            transport_status = transport_status.as_u16(),
            "downstream responded"
        );

        interpret_envelope(transport_status.as_u16(), transport_status.is_success(), document)
    }
}

/// Apply the envelope fallbacks to a response document.
pub fn interpret_envelope(
    transport_status: u16,
    transport_ok: bool,
    document: JsonValue,
) -> Result<DownstreamReply, CallFailure> {
    let ok = document
        .get("ok")
        .and_then(JsonValue::as_bool)
        .unwrap_or(transport_ok);
    let http_status = document
        .get("httpStatus")
        .and_then(JsonValue::as_u64)
        .and_then(|s| u16::try_from(s).ok())
        .unwrap_or(transport_status);

    if ok {
        let data = match document.get("data") {
            Some(data) => data.clone(),
            None => document,
        };
        return Ok(DownstreamReply { http_status, data });
    }

    let error = document.get("error");
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {http_status}"));
    let code = error
        .and_then(|e| e.get("code"))
        .and_then(JsonValue::as_str)
        .map(str::to_string);

    Err(CallFailure::application(http_status, code, message))
}

fn classify_transport_error(err: reqwest::Error) -> CallFailure {
    if err.is_timeout() {
        CallFailure::timeout(err.to_string())
    } else if err.is_connect() {
        CallFailure::transport(Some("ECONNREFUSED"), err.to_string())
    } else if err.is_request() || err.is_body() {
        CallFailure::transport(Some("ECONNRESET"), err.to_string())
    } else {
        CallFailure::transport(None, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downstream::FailureKind;
    use serde_json::json;

    #[test]
    fn envelope_data_is_unwrapped() {
        let reply = interpret_envelope(200, true, json!({"ok": true, "httpStatus": 201, "data": {"x": 1}})).unwrap();
        assert_eq!(reply.http_status, 201);
        assert_eq!(reply.data, json!({"x": 1}));
    }

    #[test]
    fn missing_fields_fall_back_to_transport() {
        let reply = interpret_envelope(200, true, json!({"x": 1})).unwrap();
        assert_eq!(reply.http_status, 200);
        assert_eq!(reply.data, json!({"x": 1}));

        let failure = interpret_envelope(503, false, json!({})).unwrap_err();
        assert_eq!(failure.http_status, 503);
        assert_eq!(failure.kind, FailureKind::Application);
        assert_eq!(failure.message, "HTTP 503");
    }

    #[test]
    fn envelope_can_override_a_2xx_transport() {
        let failure = interpret_envelope(
            200,
            true,
            json!({"ok": false, "httpStatus": 404, "error": {"message": "no such order", "code": "NotFound"}}),
        )
        .unwrap_err();
        assert_eq!(failure.http_status, 404);
        assert_eq!(failure.code.as_deref(), Some("NotFound"));
        assert_eq!(failure.message, "no such order");
    }

    #[test]
    fn missing_base_url_is_a_configuration_failure() {
        let client = HttpDownstream::new("A", reqwest::Client::new(), None, "/lambdaA");
        let failure = client.url().unwrap_err();
        assert!(failure.is_configuration());
        assert_eq!(failure.http_status, 500);
    }

    #[test]
    fn url_joins_base_and_path() {
        let client = HttpDownstream::new("A", reqwest::Client::new(), Some("http://h:1/".into()), "lambdaA");
        assert_eq!(client.url().unwrap(), "http://h:1/lambdaA");
        let client = HttpDownstream::new("B", reqwest::Client::new(), Some("http://h:1".into()), "/lambdaB");
        assert_eq!(client.url().unwrap(), "http://h:1/lambdaB");
    }
}
