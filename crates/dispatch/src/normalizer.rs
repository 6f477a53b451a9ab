//! Classifies raw upstream responses into a [`NormalizedResult`].
//!
//! Some upstream routes answer auth or version mismatches with an HTML error
//! page or an undecodable payload instead of JSON. Parsing is therefore the
//! source of truth, not the status code or the declared content type.

use bytes::Bytes;
use govbroker_types::{EndpointPolicy, NormalizedResult};
use reqwest::{
    StatusCode,
    header::{CONTENT_TYPE, HeaderMap},
};
use serde_json::Value;

/// Classifies one completed exchange.
///
/// - 2xx with an empty body → success with `null`.
/// - JSON body → success on 2xx, business error otherwise.
/// - Anything else → protocol error carrying the raw bytes.
///
/// With `supports_json_error_body` unset on the policy, non-2xx bodies are
/// not parsed at all.
#[must_use]
pub fn normalize(
    status: StatusCode,
    headers: &HeaderMap,
    body: Bytes,
    policy: &EndpointPolicy,
) -> NormalizedResult {
    let code = status.as_u16();
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if status.is_success() && body.iter().all(u8::is_ascii_whitespace) {
        return NormalizedResult::success(code, Value::Null);
    }
    if !status.is_success() && !policy.supports_json_error_body {
        return NormalizedResult::protocol_error(code, body, content_type);
    }

    match serde_json::from_slice::<Value>(&body) {
        Ok(json) if status.is_success() => NormalizedResult::success(code, json),
        Ok(json) => NormalizedResult::business_error(code, json),
        Err(_) => NormalizedResult::protocol_error(code, body, content_type),
    }
}

/// Classifies an exchange that never produced a complete response.
#[must_use]
pub fn normalize_transport_error(err: &reqwest::Error) -> NormalizedResult {
    NormalizedResult::transport_failure(error_chain(err), err.is_timeout())
}

/// `reqwest` keeps the useful detail (DNS, TLS, refused) in the source chain.
fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
